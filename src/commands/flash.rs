//! One-shot flash command and terminal progress

use std::time::Duration;

use flashdock_core::config::DockConfig;
use flashdock_core::discovery;
use flashdock_core::flash::{FlashOrchestrator, FlashProgress};
use flashdock_core::manifest::FlashEntry;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::CommandError;

/// Create a progress bar with a phase label
fn create_progress_bar_with_phase(
    total: u64,
    phase: &str,
) -> Result<ProgressBar, indicatif::style::TemplateError> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn create_spinner_style() -> Result<ProgressStyle, indicatif::style::TemplateError> {
    ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
}

/// Progress reporter drawing indicatif bars, one per manifest entry
pub struct IndicatifProgress {
    multi: MultiProgress,
    current_bar: Option<ProgressBar>,
    phase: String,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current_bar: None,
            phase: String::new(),
        }
    }

    fn create_bar(&mut self, total: u64, phase: String) {
        let pb = self.multi.add(
            create_progress_bar_with_phase(total, &phase)
                .unwrap_or_else(|_| ProgressBar::new(total)),
        );
        self.phase = phase;
        self.current_bar = Some(pb);
    }

    fn create_spinner(&mut self, message: String) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    fn finish(&mut self, message: &str) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashProgress for IndicatifProgress {
    fn connecting(&mut self) {
        self.finish("");
        self.create_spinner("Connecting to ROM loader...".into());
    }

    fn entry_started(&mut self, index: usize, entry: &FlashEntry) {
        self.finish("Connected");
        self.phase = format!(
            "#{} 0x{:08X} {}",
            index,
            entry.load_address,
            entry
                .file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
    }

    fn erasing(&mut self, address: u32, length: u32) {
        self.create_spinner(format!(
            "Erasing {} bytes at 0x{:08X}...",
            length, address
        ));
    }

    fn write_progress(&mut self, written: u32, total: u32) {
        if self.current_bar.as_ref().and_then(|pb| pb.length()) != Some(total as u64) {
            self.finish("Erase complete");
            let phase = std::mem::take(&mut self.phase);
            self.create_bar(total as u64, phase);
        }
        if let Some(pb) = &self.current_bar {
            pb.set_position(written as u64);
        }
    }

    fn verifying(&mut self, address: u32) {
        self.finish("Write complete");
        self.create_spinner(format!("Verifying 0x{:08X}...", address));
    }

    fn entry_finished(&mut self, index: usize) {
        self.finish(&format!("#{} done", index));
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.abandon();
        }
    }
}

/// Run the flash command: find the manifest and flash it once
pub fn run_flash(config: &DockConfig) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = discovery::load_manifest(&config.storage_root, &config.manifest_name)?;
    manifest.dump();

    let mut loader = super::open_loader(config)?;
    let orchestrator = FlashOrchestrator::new(super::flash_options(config));
    let mut progress = IndicatifProgress::new();

    let outcome = orchestrator.run(&mut loader, &manifest, &mut progress);
    drop(progress);

    if !outcome.is_success() {
        return Err(CommandError::Failed(outcome).into());
    }

    println!(
        "Flash complete! ({} file(s), {} bytes)",
        manifest.len(),
        manifest.total_bytes()
    );
    Ok(())
}
