mod config;
mod telemetry;

use std::sync::Arc;

use callbridge::{Bridge, CallStreamTokioExt, Delivery, NativeLibrary, PendingCallTokioExt};
use callbridge_loopback::{Function, LoopbackLibrary};
use clap::Parser;
use config::{CliArgs, LoopbackConfig};
use futures::{Stream, StreamExt};
use telemetry::init_telemetry;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = LoopbackConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let library = Arc::new(LoopbackLibrary::new(config.options)?);
    let bridge = Bridge::install(Arc::clone(&library) as Arc<dyn NativeLibrary>)?
        .with_progress_hook(|id| {
            tracing::info!("{id}: tick");
            Ok(())
        });

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    let outcome = run(&bridge, &config, &token).await;
    library.shutdown();

    match outcome {
        Ok(result) => {
            tracing::info!("{}: {}", config.function, String::from_utf8_lossy(&result));
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            tracing::warn!("{} was cancelled", config.function);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run(
    bridge: &Bridge,
    config: &LoopbackConfig,
    token: &CancellationToken,
) -> callbridge::Result<bytes::Bytes> {
    let function = config.function.function_ref();
    let args = config.input.as_bytes();

    if config.function.is_streaming() {
        let stream = bridge.stream(function, args, token)?;
        tracing::debug!("started {} as {}", config.function, stream.id());
        match config.timeout {
            Some(timeout) => drain(stream.timeout(timeout)).await,
            None => drain(stream).await,
        }
    } else {
        let call = bridge.invoke(function, args, token)?;
        tracing::debug!("started {} as {}", config.function, call.id());
        match config.timeout {
            Some(timeout) => call.timeout(timeout).await,
            None => call.await,
        }
    }
}

async fn drain<S>(stream: S) -> callbridge::Result<bytes::Bytes>
where
    S: Stream<Item = callbridge::Result<Delivery>>,
{
    let mut stream = std::pin::pin!(stream);
    while let Some(delivery) = stream.next().await {
        match delivery? {
            Delivery::Chunk(chunk) => {
                tracing::info!("chunk: {}", String::from_utf8_lossy(&chunk));
            }
            Delivery::Final(result) => return Ok(result),
        }
    }
    Err(callbridge::Error::Abandoned)
}

fn log_startup_info(config: &LoopbackConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting loopback call with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Calling {} on {} workers",
            config.function,
            config.options.workers
        );
    }
    if config.function == Function::Silent && config.timeout.is_none() {
        tracing::warn!("`silent` never calls back; press Ctrl+C or set LOOPBACK_TIMEOUT_MS");
    }
}

async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    token.cancel();
}
