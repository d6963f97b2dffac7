pub const LINES_READ: &str = "rsync_stats_lines_read_total";
pub const LINES_UNMATCHED: &str = "rsync_stats_lines_unmatched_total";
pub const CONNECTIONS_REPLACED: &str = "rsync_stats_connections_replaced_total";
pub const TRANSFERS_ORPHANED: &str = "rsync_stats_transfers_orphaned_total";
pub const GEOIP_PROCESSED: &str = "rsync_stats_geoip_processed_total";
pub const EVENTS_COMPLETED: &str = "rsync_stats_events_completed_total";
pub const ROWS_WRITTEN: &str = "rsync_stats_rows_written_total";
pub const WRITE_FAILURES: &str = "rsync_stats_write_failures_total";
