use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cutoff_file: String,
    pub users_file: String,
    pub output_directory: Option<String>,
    // Data source configuration
    pub data_source_mode: DataSourceMode,
    pub cutoff_url: Option<String>,
    pub nearest_limit: usize,
    pub top_n: usize,
    pub require_login: bool,
    pub counsel: CounselConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSourceMode {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "internet")]
    Internet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CounselConfig {
    pub enabled: bool,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_colleges: usize,
    pub api_key_env: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cutoff_file: "du_cutoff.csv".to_string(),
            users_file: "users.csv".to_string(),
            output_directory: Some("output".to_string()),
            data_source_mode: DataSourceMode::Local,
            cutoff_url: None,
            nearest_limit: 6,
            top_n: 10,
            require_login: false,
            counsel: CounselConfig::default(),
        }
    }
}

impl Default for CounselConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 30,
            max_colleges: 6,
            api_key_env: "GOOGLE_API_KEY".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }
}

/// Reservation category. Each one has its own cutoff column in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    UR,
    OBC,
    SC,
    ST,
    EWS,
    PwBD,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::UR,
        Category::OBC,
        Category::SC,
        Category::ST,
        Category::EWS,
        Category::PwBD,
    ];

    /// Upper-cased header name used for column matching.
    pub fn column_key(self) -> &'static str {
        match self {
            Category::UR => "UR",
            Category::OBC => "OBC",
            Category::SC => "SC",
            Category::ST => "ST",
            Category::EWS => "EWS",
            Category::PwBD => "PWBD",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Category::UR => 0,
            Category::OBC => 1,
            Category::SC => 2,
            Category::ST => 3,
            Category::EWS => 4,
            Category::PwBD => 5,
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        let key = name.trim().to_uppercase();
        Category::ALL.into_iter().find(|c| c.column_key() == key)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::PwBD => "PwBD",
            other => other.column_key(),
        };
        f.write_str(label)
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::from_column(s).ok_or_else(|| {
            format!("unknown category '{}' (expected one of UR, OBC, SC, ST, EWS, PwBD)", s.trim())
        })
    }
}

/// Per-category cutoff values, `None` where the cell was blank or non-numeric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores([Option<f64>; 6]);

impl CategoryScores {
    pub fn get(&self, category: Category) -> Option<f64> {
        self.0[category.index()]
    }

    pub fn set(&mut self, category: Category, value: Option<f64>) {
        self.0[category.index()] = value;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutoffRecord {
    pub college: String,
    pub program: String,
    pub cutoffs: CategoryScores,
}

impl CutoffRecord {
    pub fn cutoff(&self, category: Category) -> Option<f64> {
        self.cutoffs.get(category)
    }

    pub fn matches_program(&self, program: &str) -> bool {
        self.program.to_lowercase() == program.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CutoffTable {
    pub records: Vec<CutoffRecord>,
    pub available_categories: Vec<Category>,
}

impl CutoffTable {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.available_categories.contains(&category)
    }
}

#[derive(Debug, Clone)]
pub struct EligibilityQuery {
    pub program: String,
    pub category: Category,
    pub score: f64,
    pub girls_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibleEntry {
    pub rank: usize,
    pub college: String,
    pub program: String,
    pub category: Category,
    pub cutoff: f64,
    pub margin: f64,
}

/// A cutoff shown for reference when the applicant does not qualify anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearMiss {
    pub college: String,
    pub program: String,
    pub cutoff: f64,
}

pub const GIRLS_ONLY_COLLEGES: &[&str] = &[
    "Aditi Mahavidyalaya (W)",
    "Bhagini Nivedita College (W)",
    "Bharati College (W)",
    "Miranda House",
    "Gargi College (W)",
    "Lady Shri Ram College for Women (W)",
    "Lakshmibai College (W)",
    "Daulat Ram College (W)",
    "Indraprastha College for Women (W)",
    "Maitreyi College (W)",
    "Jesus & Mary College (W)",
    "Kamala Nehru College (W)",
    "Janki Devi Memorial College (W)",
    "Institute of Home Economics (W)",
    "Kalindi College (W)",
    "Shaheed Rajguru College of Applied Sciences for Women (W)",
    "Mata Sundri College for Women (W)",
    "Shyama Prasad Mukherjee College for Women (W)",
    "Vivekananda College (W)",
];

/// Parse a cutoff cell, returning `None` for blanks and anything non-numeric.
pub fn parse_cutoff(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
