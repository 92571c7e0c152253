//! Metric names shared by the core and the transport adapter.

/// Distinct users currently registered (gauge).
pub const ONLINE_USERS: &str = "courier_online_users";
/// Connections opened (counter).
pub const CONNECTIONS_TOTAL: &str = "courier_connections_total";
/// Connections closed (counter).
pub const DISCONNECTIONS_TOTAL: &str = "courier_disconnections_total";
/// Registrations that superseded an existing entry (counter).
pub const RECONNECTS_TOTAL: &str = "courier_reconnects_total";
/// Messages forwarded to a live recipient (counter).
pub const MESSAGES_RELAYED_TOTAL: &str = "courier_messages_relayed_total";
/// Messages dropped because the recipient is not here (counter).
pub const MESSAGES_UNDELIVERABLE_TOTAL: &str = "courier_messages_undeliverable_total";
/// Messages dropped because they did not parse (counter).
pub const MESSAGES_MALFORMED_TOTAL: &str = "courier_messages_malformed_total";
/// Send primitive failures (counter, labels: path).
pub const DELIVERY_FAILURES_TOTAL: &str = "courier_delivery_failures_total";
/// Transport faults reported by the adapter (counter).
pub const TRANSPORT_FAULTS_TOTAL: &str = "courier_transport_faults_total";
