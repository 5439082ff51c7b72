use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use xrit_demux::config::{AppConfig, SourceKind};
use xrit_demux::demux::Demuxer;
use xrit_demux::keys::KeyTable;
use xrit_demux::source;

/// Demultiplex a CCSDS LRIT/HRIT downlink into decrypted xRIT files.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "xrit-demux.toml")]
    config: PathBuf,
}

pub fn set_panic_handler() {
    let old_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!("panic: {info}");
        old_hook(info)
    }));
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    set_panic_handler();

    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;

    let keys = match &config.keys_path {
        Some(path) => KeyTable::load(path)?,
        None => KeyTable::empty(),
    };

    log::info!(
        "starting xrit-demux: spacecraft={} mode={:?} output={}",
        config.spacecraft_id,
        config.mode,
        config.output_root.display()
    );

    let demuxer = Arc::new(Demuxer::spawn(
        config.output_root.clone(),
        keys,
        config.mode,
        config.spacecraft_id,
        config.dump_path.clone(),
    ));

    let source_handle = match config.source.kind {
        SourceKind::Tcp => {
            let address = config
                .source
                .address
                .clone()
                .ok_or_else(|| anyhow::anyhow!("source.address is required for a tcp source"))?;
            source::spawn_tcp_source(address, Arc::clone(&demuxer))
        }
        SourceKind::PrefixedTcp => {
            let address = config
                .source
                .address
                .clone()
                .ok_or_else(|| anyhow::anyhow!("source.address is required for a prefixed_tcp source"))?;
            source::spawn_prefixed_tcp_source(address, Arc::clone(&demuxer))
        }
        SourceKind::File => {
            let path = config
                .source
                .path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("source.path is required for a file source"))?;
            source::spawn_file_source(path, Arc::clone(&demuxer))
        }
    };

    source_handle.join().map_err(|_| anyhow::anyhow!("frame source thread panicked"))?;

    match Arc::try_unwrap(demuxer) {
        Ok(demuxer) => demuxer.join().map_err(|err| anyhow::anyhow!(err))?,
        Err(_) => log::warn!("demuxer still has outstanding references at shutdown"),
    }

    Ok(())
}
