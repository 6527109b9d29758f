//! Memory diagnostics for resource-constrained nodes
//!
//! Every long-lived task in this firmware runs on a shared heap with no
//! virtual memory backstop, so startup and steady-state heap pressure are
//! logged at the points where the mesh subsystems allocate their biggest
//! one-time structures (scan buffers, the routing graph, binding table).

use esp_idf_sys::*;

/// Print a detailed memory statistics report
pub fn print_memory_stats(label: &str) {
    unsafe {
        let free = esp_get_free_heap_size();
        let min_free = heap_caps_get_minimum_free_size(MALLOC_CAP_DEFAULT);
        let largest = heap_caps_get_largest_free_block(MALLOC_CAP_DEFAULT);

        info!("=== MEMORY: {} ===", label);
        info!("  Free heap: {} bytes ({} KB)", free, free / 1024);
        info!("  Min free ever: {} bytes ({} KB)", min_free, min_free / 1024);
        info!("  Largest block: {} bytes ({} KB)", largest, largest / 1024);

        if free > 0 {
            let fragmentation = 100.0 - (largest as f32 / free as f32 * 100.0);
            info!("  Fragmentation: {:.1}%", fragmentation);

            if fragmentation > 25.0 {
                warn!("  High fragmentation detected!");
            }
        }

        info!("=======================");
    }
}

/// Print memory change since last measurement
pub fn print_memory_delta(label: &str, previous_free: u32) {
    unsafe {
        let current_free = esp_get_free_heap_size();
        let delta = current_free as i32 - previous_free as i32;

        if delta < 0 {
            info!(
                "[MEM] {}: {}KB -> {}KB ({} KB consumed)",
                label,
                previous_free / 1024,
                current_free / 1024,
                -delta / 1024
            );
        } else {
            info!(
                "[MEM] {}: {}KB -> {}KB (+{} KB freed)",
                label,
                previous_free / 1024,
                current_free / 1024,
                delta / 1024
            );
        }
    }
}

/// Get current free heap size (for manual tracking)
pub fn get_free_heap() -> u32 {
    unsafe { esp_get_free_heap_size() }
}

/// Print the heap low watermark (minimum free since boot)
pub fn print_heap_watermark() {
    unsafe {
        let min_free = heap_caps_get_minimum_free_size(MALLOC_CAP_DEFAULT);
        info!(
            "[MEM] Heap low watermark: {} bytes ({} KB)",
            min_free,
            min_free / 1024
        );

        if min_free < 40 * 1024 {
            warn!("Low heap watermark! Minimum free was only {} KB", min_free / 1024);
        }
    }
}
