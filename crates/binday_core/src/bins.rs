use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BinKind {
    Mix,
    Plastic,
    Paper,
    Bio,
    HeavyLoad,
}

/// Foreground/background pair used when rendering a bin badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinColors {
    pub foreground: &'static str,
    pub background: &'static str,
}

impl BinKind {
    pub const ALL: [BinKind; 5] = [
        BinKind::Mix,
        BinKind::Plastic,
        BinKind::Paper,
        BinKind::Bio,
        BinKind::HeavyLoad,
    ];

    pub fn title(self) -> &'static str {
        match self {
            BinKind::Mix => "Residual waste",
            BinKind::Plastic => "Plastic",
            BinKind::Paper => "Paper",
            BinKind::Bio => "Organic waste",
            BinKind::HeavyLoad => "Bulky waste",
        }
    }

    pub fn colors(self) -> BinColors {
        match self {
            BinKind::Mix => BinColors {
                foreground: "#FFFFFF",
                background: "#3C3C3C",
            },
            BinKind::Plastic => BinColors {
                foreground: "#1F1F1F",
                background: "#F2C12E",
            },
            BinKind::Paper => BinColors {
                foreground: "#FFFFFF",
                background: "#2E6FD8",
            },
            BinKind::Bio => BinColors {
                foreground: "#FFFFFF",
                background: "#7A4E2D",
            },
            BinKind::HeavyLoad => BinColors {
                foreground: "#FFFFFF",
                background: "#C0392B",
            },
        }
    }
}
