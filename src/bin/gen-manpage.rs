//! Man page generator for avrcal
//!
//! Writes `avrcal.1` plus one page per subcommand (`avrcal-calibrate.1`, ...).
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

fn render(cmd: clap::Command, name: &str, dir: &Path) -> io::Result<PathBuf> {
    let path = dir.join(format!("{}.1", name));
    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd).title(name).render(&mut buffer)?;
    fs::write(&path, buffer)?;
    Ok(path)
}

fn main() -> io::Result<()> {
    // Default to ./man directory
    let output_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));

    fs::create_dir_all(&output_dir)?;

    let cmd = cli::Cli::command();
    let mut pages = vec![render(cmd.clone(), cmd.get_name(), &output_dir)?];
    for sub in cmd.get_subcommands() {
        let name = format!("{}-{}", cmd.get_name(), sub.get_name());
        pages.push(render(sub.clone(), &name, &output_dir)?);
    }

    println!("Man pages generated:");
    for page in &pages {
        println!("  {}", page.display());
    }
    println!("\nTo view the main page:");
    println!("  man -l {}", pages[0].display());
    println!("\nTo install system-wide (requires sudo):");
    println!("  sudo cp {}/*.1 /usr/local/share/man/man1/", output_dir.display());
    println!("  sudo mandb");

    Ok(())
}
