//! Config subcommand - show resolved tunables

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::config::Config;

pub fn run(config: &Config) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let i = &config.intervals;
    table.add_row(vec![
        "Grid unavailable wait",
        &format!("{}s", i.unavailable_secs),
    ]);
    table.add_row(vec!["Endangered re-check", &format!("{}s", i.endangered_secs)]);
    table.add_row(vec!["Query error wait", &format!("{}s", i.query_error_secs)]);
    table.add_row(vec!["Reconnect wait", &format!("{}s", i.reconnect_secs)]);
    table.add_row(vec![
        "Secret file",
        &config.paths.secret_file.display().to_string(),
    ]);
    table.add_row(vec!["Key file", &config.paths.key_file.display().to_string()]);
    table.add_row(vec![
        "Node manager",
        &format!("{}:{}", config.node_manager.host, config.node_manager.port),
    ]);
    table.add_row(vec![
        "HTTP timeouts",
        &format!(
            "connect {}s, request {}s",
            config.http.connect_timeout_secs, config.http.request_timeout_secs
        ),
    ]);
    table.add_row(vec![
        "TLS verification",
        if config.http.insecure_tls {
            "disabled"
        } else {
            "enabled"
        },
    ]);

    eprintln!("\n{table}");
}
