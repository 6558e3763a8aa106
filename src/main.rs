use std::path::PathBuf;
use std::sync::Arc;

use persona_voice_rs::{CallRequest, Config, SessionController, SessionEvent};
use tokio::signal;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Optional first argument: path to a config file
    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(path.as_deref())?;

    let (tx_event, mut rx_event) = mpsc::unbounded_channel::<SessionEvent>();
    let mut controller = SessionController::with_alsa(&config, Arc::new(tx_event));

    let request = CallRequest::from(config.persona.clone());
    println!("Calling {}...", request.persona.name);
    if let Err(e) = controller.connect(request).await {
        eprintln!("Failed to start session: {}", e);
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("Received Ctrl+C, hanging up...");
                break;
            }

            Some(event) = rx_event.recv() => {
                match event {
                    SessionEvent::Transcript(t) => {
                        if t.is_partial {
                            println!("[{}] {}", t.timestamp.format("%H:%M:%S"), t.text);
                        } else {
                            println!("[{}] {} (end of turn)", t.timestamp.format("%H:%M:%S"), t.text);
                        }
                    }
                    SessionEvent::Volume(level) => log::trace!("Mic level {:.3}", level),
                    SessionEvent::Status(connected) => {
                        println!("Session {}", if connected { "connected" } else { "disconnected" });
                        if !connected {
                            break;
                        }
                    }
                    SessionEvent::Error(message) => eprintln!("Session error: {}", message),
                }
            }
        }
    }

    controller.disconnect();
    Ok(())
}
