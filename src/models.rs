use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

/// How many styles one request may combine. The product caps the mix at
/// three so the engine can still blend them coherently.
pub const STYLE_CAP: usize = 3;

/// The design styles the product offers. The serde representation is the
/// Vietnamese label the UI renders; it is also what the API speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesignStyle {
    #[serde(rename = "Hiện đại")]
    Modern,
    #[serde(rename = "Tối giản")]
    Minimalist,
    #[serde(rename = "Indochine")]
    Indochine,
    #[serde(rename = "Bắc Âu")]
    Scandinavian,
    #[serde(rename = "Tân cổ điển")]
    Neoclassic,
    #[serde(rename = "Nhiệt đới")]
    Tropical,
}

impl DesignStyle {
    pub const ALL: [DesignStyle; 6] = [
        DesignStyle::Modern,
        DesignStyle::Minimalist,
        DesignStyle::Indochine,
        DesignStyle::Scandinavian,
        DesignStyle::Neoclassic,
        DesignStyle::Tropical,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DesignStyle::Modern => "Hiện đại",
            DesignStyle::Minimalist => "Tối giản",
            DesignStyle::Indochine => "Indochine",
            DesignStyle::Scandinavian => "Bắc Âu",
            DesignStyle::Neoclassic => "Tân cổ điển",
            DesignStyle::Tropical => "Nhiệt đới",
        }
    }

    /// Icon name the web client maps to its inline SVG set.
    pub fn icon_name(&self) -> &'static str {
        match self {
            DesignStyle::Modern => "LayoutDashboard",
            DesignStyle::Minimalist => "Square",
            DesignStyle::Indochine => "Leaf",
            DesignStyle::Scandinavian => "Snowflake",
            DesignStyle::Neoclassic => "Gem",
            DesignStyle::Tropical => "Flower",
        }
    }

    /// English phrasing fed to the image engine when composing prompts.
    pub fn prompt_descriptor(&self) -> &'static str {
        match self {
            DesignStyle::Modern => {
                "modern style with clean lines, a neutral palette and smart storage"
            }
            DesignStyle::Minimalist => {
                "minimalist style, uncluttered, functional furniture, monochrome tones"
            }
            DesignStyle::Indochine => {
                "Indochine style with dark wood, rattan, patterned cement tiles and tropical plants"
            }
            DesignStyle::Scandinavian => {
                "Scandinavian style with light oak, white walls and soft warm textiles"
            }
            DesignStyle::Neoclassic => {
                "neoclassical style with wall mouldings, elegant lighting and marble accents"
            }
            DesignStyle::Tropical => {
                "tropical style with lush greenery, natural fibers and airy fabrics"
            }
        }
    }
}

impl std::fmt::Display for DesignStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Budget brackets in million VND ("tr"), exactly as the UI shows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetRange {
    #[serde(rename = "Dưới 50tr")]
    Under50,
    #[serde(rename = "50-100tr")]
    From50To100,
    #[serde(rename = "100-300tr")]
    From100To300,
    #[serde(rename = "Trên 300tr")]
    Over300,
}

impl BudgetRange {
    pub const ALL: [BudgetRange; 4] = [
        BudgetRange::Under50,
        BudgetRange::From50To100,
        BudgetRange::From100To300,
        BudgetRange::Over300,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BudgetRange::Under50 => "Dưới 50tr",
            BudgetRange::From50To100 => "50-100tr",
            BudgetRange::From100To300 => "100-300tr",
            BudgetRange::Over300 => "Trên 300tr",
        }
    }

    /// Material and finish tier guidance for the prompt.
    pub fn prompt_descriptor(&self) -> &'static str {
        match self {
            BudgetRange::Under50 => {
                "cost-effective choices: laminate surfaces, a paint refresh and compact multi-purpose furniture"
            }
            BudgetRange::From50To100 => {
                "mid-range choices: industrial wood furniture, quality fabrics and accent lighting"
            }
            BudgetRange::From100To300 => {
                "upper mid-range choices: natural wood veneer, stone accents and custom built-ins"
            }
            BudgetRange::Over300 => {
                "premium choices: solid wood, bespoke furniture and designer lighting"
            }
        }
    }
}

impl std::fmt::Display for BudgetRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Contact details collected by the gatekeeper form. All three fields are
/// required before the first generation call may run.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ContactInfo {
    pub name: String,
    pub phone: String,
    pub email: String,
}

impl ContactInfo {
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.phone.trim().is_empty()
            && !self.email.trim().is_empty()
    }
}

/// What the user asked the engine for: the room photo plus selections.
/// Snapshotted whenever a generation launches or a lead is emitted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DesignRequest {
    pub source_image: String,
    pub styles: Vec<DesignStyle>,
    pub budget: BudgetRange,
}

/// A completed inquiry, handed to the lead collaborators on finalization.
/// Deep copy of the session data at that moment; immutable afterwards.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Lead {
    pub id: Uuid,
    pub contact: ContactInfo,
    pub request: DesignRequest,
    #[serde(default)]
    pub chosen_index: Option<usize>,
    pub created_at: DateTime<Utc>,
}

// --- Wire DTOs ---

#[derive(Debug, Deserialize)]
pub struct SetImageRequest {
    pub image_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleStyleRequest {
    pub style: DesignStyle,
}

#[derive(Debug, Deserialize)]
pub struct SetBudgetRequest {
    pub budget: BudgetRange,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub instruction: String,
}

#[derive(Debug, Serialize)]
pub struct StyleEntry {
    pub style: DesignStyle,
    pub icon: &'static str,
}

/// Read-only lists the web client renders its pickers from.
#[derive(Debug, Serialize)]
pub struct Catalog {
    pub styles: Vec<StyleEntry>,
    pub budgets: Vec<BudgetRange>,
    pub style_cap: usize,
}

impl Catalog {
    pub fn current() -> Self {
        Catalog {
            styles: DesignStyle::ALL
                .iter()
                .map(|s| StyleEntry { style: *s, icon: s.icon_name() })
                .collect(),
            budgets: BudgetRange::ALL.to_vec(),
            style_cap: STYLE_CAP,
        }
    }
}

/// Short preview of a base64 payload for log lines. Cuts on a char boundary
/// so arbitrary UTF-8 cannot trip the slice.
pub fn b64_preview(data: &str) -> String {
    match data.char_indices().nth(50) {
        Some((cut, _)) => format!("{}...[{} chars total]", &data[..cut], data.len()),
        None => data.to_string(),
    }
}
