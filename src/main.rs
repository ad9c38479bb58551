use tracing::{error, info};

use logdemo::emitter::{Emitter, RECORD_TARGET};
use logdemo::init::init_tracing;
use logdemo::shutdown::{wait_for_signal, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (mut logger_config, emitter_config) = logdemo::env::load()?;
    // Demo records go to the configured sink; everything else is a
    // diagnostic on stderr.
    logger_config.capture_target = Some(RECORD_TARGET.to_string());
    logger_config.diagnostics = true;

    let handle = init_tracing(&logger_config)?;
    info!(
        output = %logger_config.output,
        interval_ms = emitter_config.interval.as_millis() as u64,
        "logdemo started"
    );

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let mut emitter_task = tokio::spawn(async move {
        let mut emitter = Emitter::new(emitter_config);
        emitter.run(rx).await
    });

    let iterations = tokio::select! {
        signal = wait_for_signal() => {
            match signal {
                Ok(name) => info!(signal = name, "shutdown signal received"),
                Err(e) => error!(error = %e, "signal handler failed, shutting down"),
            }
            shutdown.trigger();
            emitter_task.await
        }
        res = &mut emitter_task => res,
    };

    match iterations {
        Ok(n) => info!(iterations = n, "emitter stopped"),
        Err(e) => error!(error = %e, "emitter task failed"),
    }

    // Flush whatever is still buffered, however the loop ended.
    handle.shutdown().await?;
    Ok(())
}
