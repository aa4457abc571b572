use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Case status. The set is closed; colours only drive conditional formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "確認中")]
    Checking,
    #[serde(rename = "入金前")]
    AwaitingPayment,
    #[serde(rename = "入金済み")]
    Paid,
    #[serde(rename = "納品済み")]
    Delivered,
    #[serde(rename = "固定費")]
    FixedCost,
    #[serde(rename = "振り分け済み")]
    Allocated,
    #[serde(rename = "作成済み")]
    Issued,
    #[serde(rename = "振込前")]
    AwaitingTransfer,
    #[serde(rename = "振込済み")]
    Transferred,
}

impl Status {
    pub const ALL: [Status; 9] = [
        Status::Checking,
        Status::AwaitingPayment,
        Status::Paid,
        Status::Delivered,
        Status::FixedCost,
        Status::Allocated,
        Status::Issued,
        Status::AwaitingTransfer,
        Status::Transferred,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Status::Checking => "確認中",
            Status::AwaitingPayment => "入金前",
            Status::Paid => "入金済み",
            Status::Delivered => "納品済み",
            Status::FixedCost => "固定費",
            Status::Allocated => "振り分け済み",
            Status::Issued => "作成済み",
            Status::AwaitingTransfer => "振込前",
            Status::Transferred => "振込済み",
        }
    }

    /// Background colour as `0xRRGGBB`.
    pub fn color(self) -> u32 {
        match self {
            Status::Checking => 0xFFF9C4,
            Status::AwaitingPayment => 0xFFE0B2,
            Status::Paid => 0xC8E6C9,
            Status::Delivered => 0xBBDEFB,
            Status::FixedCost => 0xE0E0E0,
            Status::Allocated => 0xE1BEE7,
            Status::Issued => 0xB2EBF2,
            Status::AwaitingTransfer => 0xF8BBD0,
            Status::Transferred => 0xA5D6A7,
        }
    }

    pub fn labels() -> Vec<String> {
        Self::ALL.iter().map(|s| s.label().to_string()).collect()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.label() == s)
            .ok_or_else(|| format!("unknown status '{s}'"))
    }
}
