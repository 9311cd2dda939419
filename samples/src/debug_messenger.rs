//! Debug messenger sample
//!
//! Creates a Vulkan instance with the Khronos validation layer and a debug
//! utils messenger routed to `log`, lists what the loader offers and exits.
//! Run with `RUST_LOG=trace` to see verbose loader messages.

use vk_shared::foundation::logging;
use vk_shared::vulkan::VulkanInstance;

fn main() {
    logging::init("debug");

    if let Err(e) = run() {
        log::error!("debug_messenger failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let instance = VulkanInstance::new("debug_messenger", &[], true)?;

    let layers = instance.available_layers()?;
    log::info!("{} instance layer(s):", layers.len());
    for layer in &layers {
        log::info!("  {layer}");
    }

    let extensions = instance.available_extensions()?;
    log::info!("{} instance extension(s):", extensions.len());
    for extension in &extensions {
        log::info!("  {extension}");
    }

    log::info!(
        "Validation messenger {}",
        if instance.validation_enabled() { "installed" } else { "missing" }
    );
    Ok(())
}
