pub const TOPIC_MONITOR_STATUS: &str = "plantiq/monitor/status";
pub const TOPIC_MONITOR_REPORT: &str = "plantiq/monitor/report";
