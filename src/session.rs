//! Consolidates what would otherwise be process-global state (§9): the
//! control socket, the debug receiver, the placement/routing tables, and
//! the `running` flag all live on one `Session` value passed explicitly
//! between pipeline stages instead of through singletons.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::control::ControlClient;
use crate::debug::{DebugEvent, DebugReceiver};
use crate::error::Result;
use crate::linker::NodeRecord;
use crate::placement::{pack_physical_id, PlacementPlan};
use crate::routing::RoutingTables;

/// Everything the pipeline stages after placement need, owned in one place.
pub struct Session {
    pub control: ControlClient,
    pub plan: Arc<PlacementPlan>,
    pub routing: RoutingTables,
    pub nodes: Vec<NodeRecord>,
    pub running: Arc<AtomicBool>,
    pub grid_w: u32,
    pub grid_h: u32,
    pub device_ip: IpAddr,
    debug: Option<DebugReceiver>,
}

impl Session {
    /// Connects the control channel and takes ownership of the already
    /// planned placement/routing tables and parsed node list.
    ///
    /// # Errors
    /// Anything [`ControlClient::connect`] can raise.
    pub fn new(
        device_ip: IpAddr,
        grid_w: u32,
        grid_h: u32,
        plan: PlacementPlan,
        routing: RoutingTables,
        nodes: Vec<NodeRecord>,
    ) -> Result<Self> {
        let control = ControlClient::connect(device_ip)?;
        Ok(Self {
            control,
            plan: Arc::new(plan),
            routing,
            nodes,
            running: Arc::new(AtomicBool::new(true)),
            grid_w,
            grid_h,
            device_ip,
            debug: None,
        })
    }

    /// Spawns the debug receiver, installing a callback that resolves each
    /// frame's source address back to a node id via the placement map and
    /// prints it per §4.C, clearing `running` on the shutdown host-command.
    ///
    /// # Errors
    /// Anything [`DebugReceiver::spawn`] can raise.
    pub fn spawn_debug_receiver(&mut self, debug_nodes: HashSet<u32>) -> Result<()> {
        let plan = Arc::clone(&self.plan);
        let running = Arc::clone(&self.running);

        let debug = DebugReceiver::spawn(move |event| match event {
            DebugEvent::Exit { msg, text } => {
                let node_id = resolve_node(&plan, &msg);
                println!("[LOG] Node ({node_id}) exit {text}");
            }
            DebugEvent::Ticks { msg, count } => {
                let node_id = resolve_node(&plan, &msg);
                println!("[LOG] Node ({node_id}) ticks: {count}");
            }
            DebugEvent::Shutdown { millis, .. } => {
                println!("[LOG] SpiNNaker time: {millis} ms");
                running.store(false, Ordering::Release);
            }
            DebugEvent::Line { msg } => {
                let node_id = resolve_node(&plan, &msg);
                if debug_nodes.contains(&node_id) {
                    println!("[LOG] {node_id}\t({},{},{})\t{}", msg.chip_x, msg.chip_y, msg.core_id, msg.text);
                } else {
                    println!("[LOG] {node_id}\t{}", msg.text);
                }
            }
        })?;

        self.debug = Some(debug);
        Ok(())
    }

    /// Tears the session down: stops the debug receiver (closing its
    /// socket) before the control socket and tables are dropped.
    pub fn shutdown(mut self) {
        if let Some(debug) = self.debug.take() {
            debug.shutdown();
        }
    }
}

fn resolve_node(plan: &PlacementPlan, msg: &crate::debug::DebugMessage) -> u32 {
    let physical_id = pack_physical_id(msg.chip_x, msg.chip_y, msg.core_id);
    plan.map.node_id_at(physical_id).unwrap_or(0)
}
