pub mod expiry_report;
