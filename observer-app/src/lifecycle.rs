use std::time::Duration;

pub(crate) const METRIC_SHUTDOWN_COMPLETED: &str = "lifecycle_shutdown_completed_total";
pub(crate) const METRIC_COMPONENT_SHUTDOWN_DURATION: &str =
    "lifecycle_component_shutdown_duration_seconds";
pub(crate) const METRIC_COMPONENT_SHUTDOWN_RESULT: &str =
    "lifecycle_component_shutdown_result_total";

pub(crate) fn emit_shutdown_completed(service_name: &str, clean: bool) {
    metrics::counter!(
        METRIC_SHUTDOWN_COMPLETED,
        "service_name" => service_name.to_string(),
        "clean" => clean.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_component_shutdown(
    service_name: &str,
    component: &'static str,
    result: &'static str,
    duration: Duration,
) {
    metrics::counter!(
        METRIC_COMPONENT_SHUTDOWN_RESULT,
        "service_name" => service_name.to_string(),
        "component" => component,
        "result" => result
    )
    .increment(1);
    metrics::histogram!(
        METRIC_COMPONENT_SHUTDOWN_DURATION,
        "service_name" => service_name.to_string(),
        "component" => component,
        "result" => result
    )
    .record(duration.as_secs_f64());
}
