mod config;
mod endpoint;
#[cfg(test)]
mod test_utils;
mod worker;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use ffmpeg_enc::Encoder;
use tokio::signal::unix::{SignalKind, signal};

use crate::{
    config::{DEFAULT_ADDRESS, DEFAULT_CODEC, DEFAULT_WORKERS, GOP, ServerConfig},
    endpoint::Endpoint,
    worker::WorkerPool,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Encode raw YUV420 frame batches for local clients")]
struct Args {
    /// Frame width in pixels
    width: u32,

    /// Frame height in pixels
    height: u32,

    /// Unix socket path clients connect to
    #[arg(long, default_value = DEFAULT_ADDRESS)]
    addr: PathBuf,

    /// Number of encoder sessions, one per worker thread
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// FFmpeg encoder name (e.g. h264_nvenc, libx264)
    #[arg(long, default_value = DEFAULT_CODEC)]
    codec: String,
}

fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_enc", log::LevelFilter::Debug)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let args = Args::parse();

    let code = run(args).await.unwrap_or_else(|e| {
        log::error!("{:#}", e);
        1
    });
    std::process::exit(code);
}

async fn run(args: Args) -> anyhow::Result<i32> {
    let config = ServerConfig::new(args.width, args.height)
        .with_address(args.addr)
        .with_workers(args.workers)
        .with_codec(args.codec);
    config.validate()?;

    ffmpeg_enc::init()?;
    let settings = config.encoder_settings();
    let encoders = (0..config.workers())
        .map(|id| {
            Encoder::configure(&settings)
                .with_context(|| format!("failed to set up encoder for worker {}", id))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    log::info!(
        "{} {} sessions ready: {}, gop {}, frame size {} bytes",
        encoders.len(),
        settings.codec,
        config.layout(),
        GOP,
        config.layout().frame_size()
    );

    let (dispatcher, inbox) = endpoint::channel(config.queue_depth());
    let endpoint = Endpoint::bind(config.address(), config.max_request_len(), dispatcher)?;
    let pool = WorkerPool::spawn(encoders, inbox, config.layout(), GOP)?;
    log::info!("{} workers serving {}", pool.len(), endpoint.path().display());
    let mut workers = tokio::task::spawn_blocking(move || pool.join());
    let mut sigterm = signal(SignalKind::terminate()).context("install SIGTERM handler")?;

    let exited_early = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupted, shutting down");
            None
        },
        _ = sigterm.recv() => {
            log::info!("terminated, shutting down");
            None
        },
        joined = &mut workers => Some(joined),
    };

    endpoint.close();
    endpoint.closed().await;

    let code = match exited_early {
        Some(joined) => {
            let failed = joined?;
            log::error!("all workers exited ({} failed), shutting down", failed);
            1
        }
        None => {
            let failed = workers.await?;
            if failed > 0 {
                log::error!("{} worker(s) failed", failed);
                1
            } else {
                0
            }
        }
    };
    log::info!("exit {}", code);
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["nvenc-srv", "640", "480"]).unwrap();
        assert_eq!((args.width, args.height), (640, 480));
        assert_eq!(args.addr, PathBuf::from("/tmp/nvenc.sock"));
        assert_eq!(args.workers, 2);
        assert_eq!(args.codec, "h264_nvenc");
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::try_parse_from([
            "nvenc-srv",
            "320",
            "240",
            "--addr",
            "/run/enc.sock",
            "--workers",
            "4",
            "--codec",
            "libx264",
        ])
        .unwrap();
        assert_eq!(args.addr, PathBuf::from("/run/enc.sock"));
        assert_eq!(args.workers, 4);
        assert_eq!(args.codec, "libx264");
    }

    #[test]
    fn test_args_require_size() {
        assert!(Args::try_parse_from(["nvenc-srv"]).is_err());
        assert!(Args::try_parse_from(["nvenc-srv", "640"]).is_err());
        assert!(Args::try_parse_from(["nvenc-srv", "wide", "480"]).is_err());
    }
}
