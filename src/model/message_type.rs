use std::fmt;
use std::str::FromStr;

/// Classification tag attached to published messages and used by
/// subscribers to filter what they process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum MessageType {
    #[value(name = "VIP")]
    Vip,
    #[value(name = "Regular")]
    Regular,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Vip => "VIP",
            MessageType::Regular => "Regular",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VIP" => Ok(MessageType::Vip),
            "Regular" => Ok(MessageType::Regular),
            other => Err(format!("unknown message type `{other}`")),
        }
    }
}
