use serde::Serialize;

/// Process id of the rsync daemon child, as printed in the log.
pub type Pid = String;

/// `rsync to` is a client pushing into a module, `rsync on` a client pulling from one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

impl Direction {
    pub fn from_logtype(logtype: &str) -> Option<Self> {
        match logtype {
            "to" => Some(Direction::Upload),
            "on" => Some(Direction::Download),
            _ => None,
        }
    }

    pub fn logtype(&self) -> &'static str {
        match self {
            Direction::Upload => "to",
            Direction::Download => "on",
        }
    }
}

/// The `rsync to|on MODULE from USER@HOST (IP)` line that opens a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionLine {
    pub timestamp: String,
    pub pid: Pid,
    pub direction: Direction,
    pub module: String,
    pub directory: String,
    pub user: String,
    pub hostname: String,
    pub clientip: String,
}

/// The `sent N bytes received N bytes total size N` summary that closes a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLine {
    pub timestamp: String,
    pub pid: Pid,
    pub sentbytes: String,
    pub receivedbytes: String,
    pub totalbytes: String,
}

/// A connection paired with its transfer summary, before enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub connection: ConnectionLine,
    pub transfer: TransferLine,
}

/// Resolved (or fallback) location of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoTag {
    pub geohash: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedEvent {
    /// Session start, taken from the connection line; the transfer line's time is `endtime`.
    pub timestamp: String,
    pub endtime: String,
    pub pid: Pid,
    pub direction: Direction,
    pub module: String,
    pub directory: String,
    pub user: String,
    pub hostname: String,
    pub clientip: String,
    pub sentbytes: String,
    pub receivedbytes: String,
    pub totalbytes: String,
    pub geohash: String,
    pub city: String,
    pub hosthash: String,
}

impl CompletedEvent {
    pub fn new(session: Session, geo: GeoTag, hosthash: String) -> Self {
        let Session {
            connection,
            transfer,
        } = session;

        CompletedEvent {
            timestamp: connection.timestamp,
            endtime: transfer.timestamp,
            pid: transfer.pid,
            direction: connection.direction,
            module: connection.module,
            directory: connection.directory,
            user: connection.user,
            hostname: connection.hostname,
            clientip: connection.clientip,
            sentbytes: transfer.sentbytes,
            receivedbytes: transfer.receivedbytes,
            totalbytes: transfer.totalbytes,
            geohash: geo.geohash,
            city: geo.city,
            hosthash,
        }
    }
}
