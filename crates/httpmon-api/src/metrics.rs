use std::fmt::Write;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use httpmon_core::metrics::RESOURCE_TYPE;
use httpmon_core::RunnerState;

use crate::state::AppState;

/// Escape a label value per the OpenMetrics text format.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut out = String::with_capacity(4096);

    writeln!(out, "# TYPE monitorcontroller_http_response counter").unwrap();
    writeln!(
        out,
        "# HELP monitorcontroller_http_response Request attempts by URL and status"
    )
    .unwrap();
    for (labels, count) in state.counters.url_counters() {
        writeln!(
            out,
            "monitorcontroller_http_response_total{{url=\"{}\",status=\"{}\"}} {}",
            escape(&labels.url),
            labels.status,
            count
        )
        .unwrap();
    }

    writeln!(out, "# TYPE monitorcontroller_crd_http_response counter").unwrap();
    writeln!(
        out,
        "# HELP monitorcontroller_crd_http_response Request attempts by monitor, request and status"
    )
    .unwrap();
    for (labels, count) in state.counters.request_counters() {
        writeln!(
            out,
            "monitorcontroller_crd_http_response_total{{type=\"{}\",crd=\"{}\",requestName=\"{}\",targetService=\"{}\",status=\"{}\"}} {}",
            RESOURCE_TYPE,
            escape(&labels.monitor),
            escape(&labels.request),
            escape(&labels.target_service),
            labels.status,
            count
        )
        .unwrap();
    }

    let runners = state.registry.list().await;

    writeln!(out, "# TYPE httpmon_runner_state stateset").unwrap();
    writeln!(out, "# HELP httpmon_runner_state Current lifecycle state of each runner").unwrap();
    for info in &runners {
        for variant in [
            RunnerState::Idle,
            RunnerState::Running,
            RunnerState::Stopping,
            RunnerState::Stopped,
        ] {
            writeln!(
                out,
                "httpmon_runner_state{{monitor=\"{}\",httpmon_runner_state=\"{}\"}} {}",
                escape(&info.monitor.to_string()),
                variant,
                u8::from(info.state == variant)
            )
            .unwrap();
        }
    }

    writeln!(out, "# TYPE httpmon_runner_cycles counter").unwrap();
    writeln!(out, "# HELP httpmon_runner_cycles Cycles executed since the runner started").unwrap();
    for info in &runners {
        writeln!(
            out,
            "httpmon_runner_cycles_total{{monitor=\"{}\"}} {}",
            escape(&info.monitor.to_string()),
            info.cycles
        )
        .unwrap();
    }

    writeln!(out, "# TYPE httpmon_runner_failed_cycles counter").unwrap();
    writeln!(
        out,
        "# HELP httpmon_runner_failed_cycles Cycles with at least one failed request"
    )
    .unwrap();
    for info in &runners {
        writeln!(
            out,
            "httpmon_runner_failed_cycles_total{{monitor=\"{}\"}} {}",
            escape(&info.monitor.to_string()),
            info.failed_cycles
        )
        .unwrap();
    }

    writeln!(out, "# TYPE httpmon_runner_last_cycle_timestamp_seconds gauge").unwrap();
    writeln!(
        out,
        "# HELP httpmon_runner_last_cycle_timestamp_seconds Unix timestamp of the last cycle start"
    )
    .unwrap();
    for info in &runners {
        if let Some(t) = info.last_cycle_at {
            let secs = t.timestamp() as f64 + (t.timestamp_subsec_millis() as f64 / 1000.0);
            writeln!(
                out,
                "httpmon_runner_last_cycle_timestamp_seconds{{monitor=\"{}\"}} {:.3}",
                escape(&info.monitor.to_string()),
                secs
            )
            .unwrap();
        }
    }

    writeln!(out, "# TYPE httpmon_runner_uptime_seconds gauge").unwrap();
    writeln!(out, "# HELP httpmon_runner_uptime_seconds Time since the runner was started").unwrap();
    for info in &runners {
        if let Some(started) = info.started_at {
            let uptime = (chrono::Utc::now() - started).num_milliseconds() as f64 / 1000.0;
            writeln!(
                out,
                "httpmon_runner_uptime_seconds{{monitor=\"{}\"}} {:.3}",
                escape(&info.monitor.to_string()),
                uptime
            )
            .unwrap();
        }
    }

    writeln!(out, "# EOF").unwrap();

    (
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        out,
    )
}
