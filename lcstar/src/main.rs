mod options;
mod progress;
mod sample;

use anyhow::Result;
use clap::Parser;
use options::Cli;
#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::init();
    cli.run()
}
