//! Tool to inspect AMD ATOM video BIOS images
//!
//! The data tables of an image are listed via the Master Data Table. The VRAM
//! info table, which describes the memory chips a board may be equipped with
//! and their timings, is decoded in detail when given its offset, as printed
//! by the `tables` command.

use std::{fs, process::exit};

use clap::{Parser, Subcommand};
use log::{debug, error, info};

mod show;

use atom_vbios::{AtomBios, image::Image, vram};

fn parse_hex(s: &str) -> Result<usize, String> {
    let h = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    usize::from_str_radix(h, 16).map_err(|e| format!("not a hex offset: {s}: {e}"))
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the data tables referenced by the Master Data Table
    Tables {
        /// Print a hex dump of each table
        #[clap(long, short = 'x')]
        hexdump: bool,
        /// File to read
        file_name: String,
    },
    /// Decode the VRAM info table and its memory clock patch table
    #[clap(verbatim_doc_comment)]
    Vram {
        /// Print offsets of the memory setting data blocks
        #[clap(long, short)]
        print_offsets: bool,
        /// File to read
        file_name: String,
        /// Offset of the VRAM info table in hex notation
        #[clap(value_parser = parse_hex)]
        offset: usize,
    },
}

/// Inspect AMD ATOM video BIOS images
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command to run
    #[command(subcommand)]
    cmd: Command,
    #[clap(long, short, action)]
    debug: bool,
    #[clap(long, short, action)]
    verbose: bool,
}

fn read(file_name: &str) -> Vec<u8> {
    info!("Reading {file_name}...");
    match fs::read(file_name) {
        Ok(d) => d,
        Err(e) => {
            error!("Cannot read {file_name}: {e}");
            exit(1);
        }
    }
}

fn main() {
    // Default to log level "info". Otherwise, you get no "regular" logs.
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(env).init();

    let Cli {
        cmd,
        debug,
        verbose,
    } = Cli::parse();
    debug!("Command: {cmd:?}, debug: {debug}, verbose: {verbose}");
    match cmd {
        Command::Tables { hexdump, file_name } => {
            let data = read(&file_name);
            let image = Image::new(&data);
            let bios = match AtomBios::parse(&image) {
                Ok(b) => b,
                Err(e) => {
                    error!("Not an ATOM BIOS image: {e}");
                    exit(1);
                }
            };
            if verbose {
                println!("{bios:#x?}");
            }
            if !show::show_tables(&bios, image, hexdump) {
                exit(1);
            }
        }
        Command::Vram {
            print_offsets,
            file_name,
            offset,
        } => {
            let data = read(&file_name);
            let image = Image::new(&data);
            let (vram, clk_patch) = match vram::parse_vram(&image, offset) {
                Ok(r) => r,
                Err(e) => {
                    error!("Cannot decode VRAM info @ {offset:08x}: {e}");
                    exit(1);
                }
            };
            if verbose {
                println!("{vram:#x?}");
                println!("{clk_patch:#x?}");
            }
            show::show_vram(&vram, clk_patch.as_ref(), print_offsets || debug);
        }
    }
}
