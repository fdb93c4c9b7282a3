//! Render command handler.
//!
//! Runs one stream session to completion, printing progress as blocks land.
//! Ctrl-C closes the session; whatever was already written stays on disk.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reverie_engine::{
    DownloadHandle, PlaybackClock, StreamController, StreamEvent, StreamState,
};
use tokio::sync::mpsc;

use crate::bootstrap::{bootstrap, load_script};
use crate::commands::RenderArgs;
use crate::error::CliError;
use crate::parser::BackendArgs;
use crate::presentation::{format_bytes, progress_line};

const PLAYBACK_POLL: Duration = Duration::from_millis(250);

/// Execute the render command.
///
/// # Errors
///
/// Returns an error if the script or configuration cannot be loaded, the
/// session fails, or the output could not be written to disk.
pub async fn execute(args: &RenderArgs, backend: &BackendArgs) -> Result<()> {
    let script = load_script(&args.script).await?;
    if script.is_empty() {
        return Err(CliError::Arguments(format!("{} has no blocks", args.script.display())).into());
    }
    let total = script.len();

    let ctx = bootstrap(args, backend).await?;
    let clock = Arc::clone(&ctx.clock);
    let (mut controller, mut events) =
        StreamController::new(ctx.backend, ctx.clock, ctx.config, Some(ctx.output.clone()));

    println!(
        "Rendering {total} block(s) with voice '{}' to {}",
        args.voice,
        ctx.output.display()
    );
    controller.start(script, args.voice.clone())?;

    let interrupted = follow_events(&controller, &mut events, total).await;
    let outcome = controller.wait().await;

    if args.play && !interrupted && outcome.is_ok() {
        drain_playback(&controller, clock.as_ref()).await;
    }
    controller.close();

    report(outcome.map_err(CliError::from)?)
}

/// Print events until the session ends. Returns `true` on Ctrl-C.
async fn follow_events(
    controller: &StreamController,
    events: &mut mpsc::UnboundedReceiver<StreamEvent>,
    total: usize,
) -> bool {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(StreamEvent::Progress { percent, blocks_done }) => {
                    println!("{}", progress_line(percent, blocks_done, total));
                }
                Some(StreamEvent::ReadyToPlay) => println!("Ready to play"),
                Some(StreamEvent::StateChanged(state)) => {
                    tracing::debug!(?state, "Session state");
                    if state == StreamState::Closed {
                        return false;
                    }
                }
                Some(StreamEvent::Error(message)) => {
                    eprintln!("Session failed: {message}");
                    return false;
                }
                Some(StreamEvent::Complete(_)) | None => return false,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted, closing session");
                controller.close();
                return true;
            }
        }
    }
}

/// Keep the process alive until everything scheduled has played.
async fn drain_playback(controller: &StreamController, clock: &dyn PlaybackClock) {
    let end = controller.timeline_end();
    println!("Playing ({:.0} s left)", (end - clock.now()).max(0.0));
    while clock.now() < end {
        tokio::select! {
            () = tokio::time::sleep(PLAYBACK_POLL) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("Playback stopped");
                return;
            }
        }
    }
}

fn report(handle: DownloadHandle) -> Result<()> {
    match handle {
        DownloadHandle::File(path) => {
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or_default();
            println!("Saved {} ({})", path.display(), format_bytes(size));
            Ok(())
        }
        DownloadHandle::Memory(chunks) => {
            let size: usize = chunks.iter().map(|c| c.len()).sum();
            Err(CliError::Io(format!(
                "output file could not be written; {} of audio was kept in memory only",
                format_bytes(size as u64)
            ))
            .into())
        }
    }
}
