//! List a PFS0 (NSP) archive and optionally extract it.
//!
//! ```text
//! cargo run --example pfs0 -- game.nsp [out_dir]
//! RUST_LOG=hakkit_fs=debug cargo run --example pfs0 -- game.nsp out
//! ```

use std::fs::{self, File};
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use hakkit_fs::client::FsClient;
use hakkit_fs::fs::copy::{ProgressReport, copy_directory};
use hakkit_fs::fs::{CreateOptions, LocalFileSystem, OpenDirectoryMode, Pfs0FileSystem};
use hakkit_fs::storage::StreamStorage;
use hakkit_fs::{Error, Result};

struct Progress {
    total: u64,
    done: u64,
}

impl ProgressReport for Progress {
    fn set_total(&mut self, total: u64) {
        self.total = total;
    }

    fn report_add(&mut self, bytes: u64) {
        self.done += bytes;
    }

    fn log_message(&mut self, message: &str) {
        eprintln!("[{:>3}%] {message}", self.done * 100 / self.total.max(1));
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::builder().from_env_lossy())
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();

    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .ok_or(Error::InvalidArgument("usage: pfs0 <archive> [out_dir]"))?;
    let output = args.next();

    let client = FsClient::new();
    let archive = StreamStorage::new(File::open(&input)?);
    client.mount("nsp", Arc::new(Pfs0FileSystem::new(Arc::new(archive))?))?;

    for entry in client.read_dir("nsp:/", OpenDirectoryMode::ALL)? {
        println!("{:>12}  {}", entry.size, entry.name);
    }

    if let Some(output) = output {
        fs::create_dir_all(&output)?;
        let nsp = client.mount_table().find("nsp")?;
        let out = LocalFileSystem::new(&output)?;
        let mut progress = Progress { total: 0, done: 0 };
        copy_directory(
            nsp.filesystem().as_ref(),
            "/",
            &out,
            "/",
            CreateOptions::empty(),
            &mut progress,
        )?;
        println!("extracted {} bytes to {output}", progress.done);
    }

    client.unmount("nsp")
}
