//! Console-driven dock
//!
//! Runs the dock with button gestures and storage events typed on stdin,
//! one command per line:
//!
//! | Command  | Event                          |
//! |----------|--------------------------------|
//! | `click`  | single button press            |
//! | `double` | double press                   |
//! | `long`   | long press                     |
//! | `attach` | host claims the storage        |
//! | `detach` | host releases the storage      |
//! | `status` | print the current state        |
//! | `quit`   | wait for a running flash, exit |

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flashdock_core::config::DockConfig;
use flashdock_core::device::{DeviceState, DockEvent, Gesture, Indicator, StorageStatus};
use flashdock_core::dock::Dock;

use super::flash::IndicatifProgress;

/// Indicator that logs every state change
struct LogIndicator;

impl Indicator for LogIndicator {
    fn set(&self, state: DeviceState) {
        log::info!("[{}]", state);
    }
}

/// Storage claim flag toggled by `attach` and `detach`
#[derive(Default)]
struct ConsoleStorage(AtomicBool);

impl StorageStatus for ConsoleStorage {
    fn is_claimed_externally(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleCommand {
    Event(DockEvent),
    Status,
    Quit,
}

/// Parse one console line; blank lines yield `None`
fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let command = match line.trim() {
        "" => return Ok(None),
        "click" | "c" => ConsoleCommand::Event(DockEvent::Button(Gesture::Click)),
        "double" | "d" => ConsoleCommand::Event(DockEvent::Button(Gesture::DoubleClick)),
        "long" | "l" => ConsoleCommand::Event(DockEvent::Button(Gesture::LongPress)),
        "attach" => ConsoleCommand::Event(DockEvent::StorageVisibility {
            externally_visible: true,
        }),
        "detach" => ConsoleCommand::Event(DockEvent::StorageVisibility {
            externally_visible: false,
        }),
        "status" | "s" => ConsoleCommand::Status,
        "quit" | "q" | "exit" => ConsoleCommand::Quit,
        other => {
            return Err(format!(
                "unknown command \"{}\" (click, double, long, attach, detach, status, quit)",
                other
            ))
        }
    };
    Ok(Some(command))
}

/// Run the dock until `quit` or end of input
pub fn run_dock(config: &DockConfig) -> Result<(), Box<dyn std::error::Error>> {
    let loader = super::open_loader(config)?;
    let storage = Arc::new(ConsoleStorage::default());

    let mut config = config.clone();
    config.flash.verify = super::flash_options(&config).verify;

    let dock = Dock::spawn(
        &config,
        loader,
        Arc::new(LogIndicator),
        storage.clone(),
        IndicatifProgress::new(),
    )?;

    println!("Dock ready. Commands: click, double, long, attach, detach, status, quit");

    for line in io::stdin().lock().lines() {
        let line = line?;
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        match command {
            ConsoleCommand::Quit => break,
            ConsoleCommand::Status => {
                let machine = dock.machine();
                println!("State: {}", machine.state());
                match machine.manifest() {
                    Some(manifest) => println!(
                        "Manifest: {} file(s) from {}",
                        manifest.len(),
                        manifest.source_dir().display()
                    ),
                    None => println!("Manifest: none"),
                }
            }
            ConsoleCommand::Event(event) => {
                if let DockEvent::StorageVisibility { externally_visible } = event {
                    storage.0.store(externally_visible, Ordering::SeqCst);
                }
                if let Err(e) = dock.dispatch(event) {
                    println!("Rejected: {}", e);
                }
            }
        }
    }

    dock.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gestures() {
        assert_eq!(
            parse_command("click"),
            Ok(Some(ConsoleCommand::Event(DockEvent::Button(Gesture::Click))))
        );
        assert_eq!(
            parse_command("  d \n"),
            Ok(Some(ConsoleCommand::Event(DockEvent::Button(
                Gesture::DoubleClick
            ))))
        );
        assert_eq!(
            parse_command("long"),
            Ok(Some(ConsoleCommand::Event(DockEvent::Button(
                Gesture::LongPress
            ))))
        );
    }

    #[test]
    fn test_parse_storage_events() {
        assert_eq!(
            parse_command("attach"),
            Ok(Some(ConsoleCommand::Event(DockEvent::StorageVisibility {
                externally_visible: true
            })))
        );
        assert_eq!(
            parse_command("detach"),
            Ok(Some(ConsoleCommand::Event(DockEvent::StorageVisibility {
                externally_visible: false
            })))
        );
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_command(""), Ok(None));
        assert_eq!(parse_command("status"), Ok(Some(ConsoleCommand::Status)));
        assert_eq!(parse_command("q"), Ok(Some(ConsoleCommand::Quit)));
        assert!(parse_command("flash now").is_err());
    }

    #[test]
    fn test_console_storage_claim() {
        let storage = ConsoleStorage::default();
        assert!(!storage.is_claimed_externally());
        storage.0.store(true, Ordering::SeqCst);
        assert!(storage.is_claimed_externally());
    }
}
