pub mod json_report_adapter;
pub mod sqlite_report_adapter;

pub use json_report_adapter::JsonReportSink;
pub use sqlite_report_adapter::SqliteReportSink;
