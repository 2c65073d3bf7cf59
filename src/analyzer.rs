use crate::models::{
    Category, CutoffRecord, CutoffTable, EligibilityQuery, EligibleEntry, NearMiss,
    GIRLS_ONLY_COLLEGES,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Conditions under which a query cannot be evaluated at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIssue {
    DataUnavailable,
    CategoryUnavailable(Category),
    ProgramNotFound,
}

impl fmt::Display for QueryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryIssue::DataUnavailable => {
                write!(f, "cutoff dataset not found or empty, upload one first")
            }
            QueryIssue::CategoryUnavailable(category) => {
                write!(f, "cutoff category '{}' not available for this program", category)
            }
            QueryIssue::ProgramNotFound => write!(f, "no data found for selected program"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankSummary {
    pub eligible_colleges: usize,
    pub highest_margin: f64,
    pub lowest_margin: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FindOutcome {
    Eligible {
        entries: Vec<EligibleEntry>,
        summary: RankSummary,
    },
    /// Valid query, nothing qualifies. Closest cutoffs are kept for reference.
    NoEligibleMatch { nearest: Vec<NearMiss> },
}

pub struct EligibilityAnalyzer<'a> {
    pub girls_only_colleges: &'a [&'a str],
}

impl EligibilityAnalyzer<'static> {
    pub fn new() -> Self {
        Self::with_allowlist(GIRLS_ONLY_COLLEGES)
    }
}

impl Default for EligibilityAnalyzer<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> EligibilityAnalyzer<'a> {
    pub fn with_allowlist(girls_only_colleges: &'a [&'a str]) -> Self {
        Self {
            girls_only_colleges,
        }
    }

    /// Select the rows of `program` that carry a value for `category`.
    pub fn filter<'t>(
        &self,
        table: &'t CutoffTable,
        program: &str,
        category: Category,
        girls_only: bool,
    ) -> Result<Vec<&'t CutoffRecord>, QueryIssue> {
        if table.is_empty() {
            return Err(QueryIssue::DataUnavailable);
        }
        if !table.has_category(category) {
            return Err(QueryIssue::CategoryUnavailable(category));
        }

        let program_rows: Vec<&CutoffRecord> = table
            .records
            .iter()
            .filter(|record| record.matches_program(program))
            .filter(|record| !girls_only || self.girls_only_colleges.contains(&record.college.as_str()))
            .collect();

        if program_rows.is_empty() {
            return Err(QueryIssue::ProgramNotFound);
        }

        let evaluable: Vec<&CutoffRecord> = program_rows
            .into_iter()
            .filter(|record| record.cutoff(category).is_some())
            .collect();

        tracing::debug!(
            program,
            category = %category,
            girls_only,
            rows = evaluable.len(),
            "filtered cutoff rows"
        );

        Ok(evaluable)
    }

    /// Run a full query: filter, rank, and fall back to nearest misses.
    pub fn find(
        &self,
        table: &CutoffTable,
        query: &EligibilityQuery,
        nearest_limit: usize,
    ) -> Result<FindOutcome, QueryIssue> {
        let rows = self.filter(table, &query.program, query.category, query.girls_only)?;
        let entries = rank(&rows, query.category, query.score);

        match summarize(&entries) {
            Some(summary) => {
                tracing::info!(
                    program = %query.program,
                    category = %query.category,
                    score = query.score,
                    eligible = summary.eligible_colleges,
                    "eligible colleges found"
                );
                Ok(FindOutcome::Eligible { entries, summary })
            }
            None => {
                tracing::info!(
                    program = %query.program,
                    category = %query.category,
                    score = query.score,
                    "no eligible colleges, collecting nearest cutoffs"
                );
                Ok(FindOutcome::NoEligibleMatch {
                    nearest: nearest(&rows, query.category, nearest_limit),
                })
            }
        }
    }
}

fn by_cutoff(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Rank the records whose cutoff is at most `score`, safest first.
pub fn rank(records: &[&CutoffRecord], category: Category, score: f64) -> Vec<EligibleEntry> {
    let mut entries: Vec<EligibleEntry> = records
        .iter()
        .filter_map(|record| {
            let cutoff = record.cutoff(category)?;
            (cutoff <= score).then(|| EligibleEntry {
                rank: 0,
                college: record.college.clone(),
                program: record.program.clone(),
                category,
                cutoff,
                margin: score - cutoff,
            })
        })
        .collect();

    // Stable, so ties keep table order
    entries.sort_by(|a, b| by_cutoff(b.margin, a.margin));

    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i + 1;
    }

    entries
}

pub fn summarize(entries: &[EligibleEntry]) -> Option<RankSummary> {
    let first = entries.first()?;
    let (highest_margin, lowest_margin) = entries
        .iter()
        .fold((first.margin, first.margin), |(hi, lo), entry| {
            (hi.max(entry.margin), lo.min(entry.margin))
        });

    Some(RankSummary {
        eligible_colleges: entries.len(),
        highest_margin,
        lowest_margin,
    })
}

/// Lowest cutoffs first, at most `limit` of them.
pub fn nearest(records: &[&CutoffRecord], category: Category, limit: usize) -> Vec<NearMiss> {
    let mut misses: Vec<NearMiss> = records
        .iter()
        .filter_map(|record| {
            record.cutoff(category).map(|cutoff| NearMiss {
                college: record.college.clone(),
                program: record.program.clone(),
                cutoff,
            })
        })
        .collect();

    misses.sort_by(|a, b| by_cutoff(a.cutoff, b.cutoff));
    misses.truncate(limit);
    misses
}

/// Mean cutoff per college over present values, most accessible first.
pub fn average_by_college(table: &CutoffTable, category: Category) -> Vec<(String, f64)> {
    let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();

    for record in &table.records {
        if record.college.is_empty() {
            continue;
        }
        if let Some(cutoff) = record.cutoff(category) {
            let slot = sums.entry(record.college.as_str()).or_insert((0.0, 0));
            slot.0 += cutoff;
            slot.1 += 1;
        }
    }

    let mut averages: Vec<(String, f64)> = sums
        .into_iter()
        .map(|(college, (sum, count))| (college.to_string(), sum / count as f64))
        .collect();

    averages.sort_by(|a, b| by_cutoff(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
    averages
}

pub fn top_n_accessible(
    table: &CutoffTable,
    program: &str,
    category: Category,
    n: usize,
) -> Vec<NearMiss> {
    let rows: Vec<&CutoffRecord> = table
        .records
        .iter()
        .filter(|record| record.matches_program(program))
        .collect();

    nearest(&rows, category, n)
}
