//! Show the manifest found in the storage

use flashdock_core::config::DockConfig;
use flashdock_core::discovery;

/// Find the manifest and print what a flash would do
pub fn run_show(config: &DockConfig) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = discovery::load_manifest(&config.storage_root, &config.manifest_name)?;

    println!("Manifest in {}", manifest.source_dir().display());
    println!(
        "Target: {}",
        manifest
            .target_chip()
            .map(|c| c.name())
            .unwrap_or("unspecified")
    );
    if let Some(settings) = manifest.flash_settings() {
        println!(
            "Flash:  mode {}, size {}, freq {}",
            settings.flash_mode.as_deref().unwrap_or("-"),
            settings.flash_size.as_deref().unwrap_or("-"),
            settings.flash_freq.as_deref().unwrap_or("-")
        );
    }
    println!();
    println!("  {:<12} {:>10}  File", "Address", "Size");
    println!("  {:-<12} {:->10}  {:-<30}", "", "", "");
    for entry in manifest.entries() {
        println!(
            "  0x{:08X}   {:>10}  {}",
            entry.load_address,
            entry.byte_length,
            entry.file_path.display()
        );
    }
    println!();
    println!(
        "{} file(s), {} bytes total",
        manifest.len(),
        manifest.total_bytes()
    );

    Ok(())
}
