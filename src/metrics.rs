// ABOUTME: Thin wrappers around the metrics facade for bridge and task counters.
// ABOUTME: Exporter installation is the host's concern; recording is unconditional.

/// Record a successfully established agent connection.
pub fn record_connected() {
    metrics::counter!("gantry_connections_total").increment(1);
}

/// Record a scheduled reconnect attempt.
pub fn record_reconnect_scheduled() {
    metrics::counter!("gantry_reconnects_total").increment(1);
}

/// Record an inbound frame by wire type.
pub fn record_frame_in(kind: &str) {
    metrics::counter!("gantry_frames_in_total", "type" => kind.to_string()).increment(1);
}

/// Record an outbound frame by wire type.
pub fn record_frame_out(kind: &str) {
    metrics::counter!("gantry_frames_out_total", "type" => kind.to_string()).increment(1);
}

/// Record a remote action invocation sent to the agent.
pub fn record_action_invoked() {
    metrics::counter!("gantry_actions_invoked_total").increment(1);
}

/// Record an action completion by outcome ("success" or "error").
pub fn record_action_completed(outcome: &str) {
    metrics::counter!("gantry_actions_completed_total", "outcome" => outcome.to_string())
        .increment(1);
}

/// Record one executed task step (either mode).
pub fn record_task_step(mode: &str) {
    metrics::counter!("gantry_task_steps_total", "mode" => mode.to_string()).increment(1);
}

/// Record an applied edit batch and the number of files it touched.
pub fn record_edits_applied(files: usize) {
    metrics::counter!("gantry_edit_batches_total").increment(1);
    metrics::counter!("gantry_edited_files_total").increment(files as u64);
}
