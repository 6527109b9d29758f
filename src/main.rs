use anyhow::Result;
use std::sync::Arc;
use std::thread;
use treemesh::api::validate_init;
use treemesh::events::EventFlags;
use treemesh::node::MeshRuntime;
use treemesh::radio::wifi::WifiRadio;
use treemesh::radio::Radio;
use treemesh::tasks::{binding_server_task, fsm_task, heartbeat_client_task, routing_task};
use treemesh::utils::get_embedded_env_value;
use treemesh::version::{BUILD_TIMESTAMP, FIRMWARE_VERSION};
use treemesh::{diagnostics, error, info};

fn main() -> Result<()> {
    diagnostics::print_memory_stats("STARTUP");
    let mem_after_startup = diagnostics::get_free_heap();

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    diagnostics::print_memory_delta("After ESP IDF Sys link patches", mem_after_startup);

    info!(
        "treemesh-firmware {} (built {})",
        FIRMWARE_VERSION, BUILD_TIMESTAMP
    );

    let mesh_prefix = get_embedded_env_value("MESH_PREFIX");
    let mesh_password = get_embedded_env_value("MESH_PASSWORD");

    let config = validate_init(&mesh_prefix, &mesh_password).map_err(|e| {
        error!("main: invalid mesh config: {e}");
        anyhow::anyhow!(e)
    })?;

    let wireless_events = Arc::new(EventFlags::new());
    let mut radio = WifiRadio::new(Arc::clone(&wireless_events))?;
    radio.init()?;
    let self_mac = radio.get_node_short_mac()?;
    info!("main: this node's short MAC is {self_mac}");

    let runtime = Arc::new(MeshRuntime::new(radio, config, self_mac, wireless_events));

    diagnostics::print_heap_watermark();

    let handles = vec![
        thread::Builder::new()
            .stack_size(0x1500)
            .spawn({
                let runtime = Arc::clone(&runtime);
                move || fsm_task(runtime)
            })?,
        thread::Builder::new()
            .stack_size(0x1500)
            .spawn({
                let runtime = Arc::clone(&runtime);
                move || routing_task(runtime)
            })?,
        thread::Builder::new()
            .stack_size(0x1000)
            .spawn({
                let runtime = Arc::clone(&runtime);
                move || binding_server_task(runtime)
            })?,
        thread::Builder::new()
            .stack_size(0x1000)
            .spawn({
                let runtime = Arc::clone(&runtime);
                move || heartbeat_client_task(runtime)
            })?,
    ];

    loop {
        thread::sleep(std::time::Duration::from_secs(5));
        diagnostics::print_memory_stats("HEARTBEAT");
        info!(
            "main: connected={} tree_level={:?}",
            runtime.connected.get(),
            runtime.config.lock().unwrap().tree_level
        );
        if !runtime.is_running() {
            break;
        }
    }

    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}
