//! Demo firmware image: joins (or founds) a mesh and persists a
//! rejoin hint to NVS so the next boot can prefer the same root
//! instead of racing every visible SSID from a cold scan.
//!
//! Grounded in the teacher's `main.rs` (the same `link_patches` +
//! `EspLogger::initialize_default` + `get_embedded_env_value` startup
//! sequence) plus `esp-idf-svc`'s `nvs` module, which the teacher
//! pack's other examples use for small persisted key/value state.

use anyhow::Result;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use treemesh::api::validate_init;
use treemesh::events::EventFlags;
use treemesh::node::MeshRuntime;
use treemesh::radio::wifi::WifiRadio;
use treemesh::radio::Radio;
use treemesh::shortmac::ShortMac;
use treemesh::tasks::{binding_server_task, fsm_task, heartbeat_client_task, routing_task};
use treemesh::utils::get_embedded_env_value;
use treemesh::{info, warn};

const NVS_NAMESPACE: &str = "treemesh";
const NVS_KEY: &str = "rejoin_hint";
const NVS_BUF_LEN: usize = 64;

/// The last root this node attached under and the tree level it held,
/// so a reboot can bias its first scan toward the mesh it already
/// knew rather than treating every boot like a cold start.
#[derive(Debug, Serialize, Deserialize)]
struct RejoinHint {
    root_short_mac: String,
    tree_level: u8,
}

fn load_rejoin_hint(nvs: &EspNvs<NvsDefault>) -> Option<RejoinHint> {
    let mut buf = [0u8; NVS_BUF_LEN];
    let stored = nvs.get_raw(NVS_KEY, &mut buf).ok().flatten()?;
    match serde_json::from_slice(stored) {
        Ok(hint) => Some(hint),
        Err(e) => {
            warn!("join_mesh: stored rejoin hint is corrupt, ignoring: {e}");
            None
        }
    }
}

fn store_rejoin_hint(nvs: &mut EspNvs<NvsDefault>, root: ShortMac, tree_level: u8) {
    let hint = RejoinHint {
        root_short_mac: root.as_str().to_string(),
        tree_level,
    };
    match serde_json::to_vec(&hint) {
        Ok(bytes) => {
            if let Err(e) = nvs.set_raw(NVS_KEY, &bytes) {
                warn!("join_mesh: failed to persist rejoin hint: {e:?}");
            }
        }
        Err(e) => warn!("join_mesh: failed to encode rejoin hint: {e}"),
    }
}

fn main() -> Result<()> {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    let nvs_partition = EspDefaultNvsPartition::take()?;
    let mut nvs = EspNvs::new(nvs_partition, NVS_NAMESPACE, true)?;

    if let Some(hint) = load_rejoin_hint(&nvs) {
        info!(
            "join_mesh: found rejoin hint: root={} level={}",
            hint.root_short_mac, hint.tree_level
        );
    } else {
        info!("join_mesh: no rejoin hint on record, cold start");
    }

    let mesh_prefix = get_embedded_env_value("MESH_PREFIX");
    let mesh_password = get_embedded_env_value("MESH_PASSWORD");
    let config = validate_init(&mesh_prefix, &mesh_password).map_err(|e| anyhow::anyhow!(e))?;

    let wireless_events = Arc::new(EventFlags::new());
    let mut radio = WifiRadio::new(Arc::clone(&wireless_events))?;
    radio.init()?;
    let self_mac = radio.get_node_short_mac()?;

    let runtime = Arc::new(MeshRuntime::new(radio, config, self_mac, wireless_events));

    let handles = vec![
        thread::Builder::new().stack_size(0x1500).spawn({
            let runtime = Arc::clone(&runtime);
            move || fsm_task(runtime)
        })?,
        thread::Builder::new().stack_size(0x1500).spawn({
            let runtime = Arc::clone(&runtime);
            move || routing_task(runtime)
        })?,
        thread::Builder::new().stack_size(0x1000).spawn({
            let runtime = Arc::clone(&runtime);
            move || binding_server_task(runtime)
        })?,
        thread::Builder::new().stack_size(0x1000).spawn({
            let runtime = Arc::clone(&runtime);
            move || heartbeat_client_task(runtime)
        })?,
    ];

    loop {
        thread::sleep(std::time::Duration::from_secs(10));
        let cfg = runtime.config.lock().unwrap();
        if let (Some(root), Some(level)) = (cfg.root_short_mac, cfg.tree_level) {
            store_rejoin_hint(&mut nvs, root, level);
        }
        drop(cfg);
        if !runtime.is_running() {
            break;
        }
    }

    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}
