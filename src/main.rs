//! CLI entry point: `loader <linker_file> [debug_node ...]`. Orchestrates
//! the full pipeline — parse, place, route, boot, load, start, supervise,
//! drain — described component-by-component in the rest of this crate.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

mod boot;
mod config;
mod constants;
mod control;
mod debug;
mod error;
mod image;
mod intvec;
mod linker;
mod logformat;
mod placement;
mod routing;
mod session;
mod supervisor;
mod wire;

use constants::MONITOR_CORE_ID;
use control::DeviceAddress;
use error::{LoaderError, Result};
use session::Session;

/// Host loader for a SpiNNaker-style many-core neuromorphic fabric.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Binary linker file describing the logical node graph to load.
    linker_file: PathBuf,

    /// Logical node ids to run with verbose (address-annotated) debug output.
    debug_node: Vec<u32>,

    /// Boot image uploaded before the control channel comes up.
    #[arg(long, default_value = "boot.bin")]
    boot: PathBuf,

    /// Device configuration file (`"<ip> <grid_w> <grid_h>"`).
    #[arg(long, default_value = "spinnaker.ini")]
    config: PathBuf,
}

fn run(args: Args) -> Result<()> {
    let device_config = config::DeviceConfig::load(&args.config)?;
    let device_ip = IpAddr::V4(device_config.ip);
    let grid_w = device_config.grid_w;
    let grid_h = device_config.grid_h;

    println!("[LOG] loading linker file {}", args.linker_file.display());
    let nodes = linker::load_linker_file(&args.linker_file)?;

    let node_ids: Vec<u32> = nodes.iter().map(|n| n.node_id).collect();
    println!("[LOG] placing {} nodes on a {grid_w}x{grid_h} grid", node_ids.len());
    let plan = placement::plan_placement(&node_ids, grid_w, grid_h)?;

    let mut routing = routing::RoutingTables::default();
    for node in &nodes {
        for subscription in &node.interrupts {
            routing::plan_route(&mut routing, subscription.src_node, node.node_id, |n| plan.map.physical_id_of(n))?;
        }
    }

    println!("[LOG] uploading boot image {}", args.boot.display());
    boot::upload_boot_image(&args.boot, device_ip)?;

    let mut session = Session::new(device_ip, grid_w, grid_h, plan, routing, nodes)?;

    let monitor = DeviceAddress::new(0, 0, MONITOR_CORE_ID)?;
    session.control.test_connection(monitor)?;
    session.control.configure_debug_routing(monitor, 0, grid_w, grid_h)?;

    let debug_nodes: HashSet<u32> = args.debug_node.iter().copied().collect();
    session.spawn_debug_receiver(debug_nodes.clone())?;

    let chip_count = grid_w * grid_h;
    let prototype_dir = args.linker_file.parent().unwrap_or_else(|| Path::new("."));

    for node in &session.nodes {
        let placement = session.plan.get(node.node_id).expect("every parsed node was placed");
        let dev = DeviceAddress::new(placement.chip_x, placement.chip_y, placement.core_id)?;
        let layout = image::compute_layout(node, placement.core_id)?;
        let debug_mode = debug_nodes.contains(&node.node_id);
        println!("[LOG] loading node {} at ({},{},{})", node.node_id, placement.chip_x, placement.chip_y, placement.core_id);
        image::load_node(
            &session.control,
            dev,
            node,
            &layout,
            debug_mode,
            chip_count,
            grid_w,
            grid_h,
            &session.plan.core_maps,
            &session.routing,
            prototype_dir,
        )?;

        if debug_mode {
            let mismatches = image::validate_node(&session.control, dev, node, &layout)?;
            for detail in mismatches {
                // Non-fatal: reuses ValidationMismatch only for its Display
                // formatting, never propagated as an Err.
                eprintln!("[WARN] {}", LoaderError::ValidationMismatch { node_id: node.node_id, detail });
            }
        }
    }

    println!("[LOG] starting applications");
    supervisor::start_all(&session.control, &session.plan, grid_w, grid_h)?;

    println!("[LOG] running; waiting for shutdown signal");
    supervisor::wait_for_shutdown(&session.running);

    println!("[LOG] draining logs");
    supervisor::drain_all(&session.control, &session.plan, &session.nodes, grid_w, grid_h)?;

    session.shutdown();
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("[WARN] {err}");
            ExitCode::FAILURE
        }
    }
}
