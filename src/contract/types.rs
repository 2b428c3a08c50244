//! Records exchanged with the arbitration contract.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A moderation case as stored on the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationCase {
    pub id: String,
    /// Description or evidence link.
    #[serde(deserialize_with = "null_as_default")]
    pub incident_report: String,
    /// Ruleset the judge evaluates the report against.
    #[serde(deserialize_with = "null_as_default")]
    pub community_rules: String,
    #[serde(deserialize_with = "null_as_default")]
    pub case_resolved: bool,
    /// "Dismissed", "Warning", "Temporary Ban", ... `None` until resolved.
    pub verdict: Option<String>,
    pub reasoning: Option<String>,
    /// Address that filed the report.
    pub owner: Option<String>,
}

/// Unresolved cases carry explicit nulls for fields that have no value yet.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationEntry {
    pub address: String,
    pub points: i64,
}

/// Client-side case filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFilters {
    pub resolved: Option<bool>,
    /// Matched case-insensitively.
    pub owner: Option<String>,
}

impl CaseFilters {
    pub fn matches(&self, case: &ModerationCase) -> bool {
        if let Some(resolved) = self.resolved
            && case.case_resolved != resolved
        {
            return false;
        }
        if let Some(owner) = &self.owner
            && !case
                .owner
                .as_deref()
                .is_some_and(|case_owner| owner.eq_ignore_ascii_case(case_owner))
        {
            return false;
        }
        true
    }
}

/// Consensus status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Accepted,
    Finalized,
    Rejected,
    /// Any intermediate consensus stage (proposing, committing, ...).
    Other(String),
}

impl TxStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Finalized => "FINALIZED",
            Self::Rejected => "REJECTED",
            Self::Other(s) => s,
        }
    }

    /// Accepted or later.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted | Self::Finalized)
    }
}

impl From<&str> for TxStatus {
    fn from(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "ACCEPTED" => Self::Accepted,
            "FINALIZED" => Self::Finalized,
            "REJECTED" => Self::Rejected,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TxStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TxStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub status: TxStatus,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Remaining fields returned by the node.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decode `get_all_cases`: either an object keyed by case id or a list of
/// `[id, {fields}]` pairs. Anything else yields no cases. The key always
/// wins over an `id` field inside the record.
pub fn parse_cases(value: Value) -> Vec<ModerationCase> {
    let entries: Vec<(String, Value)> = match value {
        Value::Object(map) => map.into_iter().collect(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Array(pair) if pair.len() == 2 => {
                    let mut pair = pair.into_iter();
                    let id = pair.next().and_then(|id| scalar_to_string(&id))?;
                    Some((id, pair.next()?))
                }
                other => {
                    tracing::debug!("Skipping malformed case entry: {}", other);
                    None
                }
            })
            .collect(),
        _ => return Vec::new(),
    };

    entries
        .into_iter()
        .filter_map(|(id, fields)| {
            let fields = pairs_to_object(fields);
            match serde_json::from_value::<ModerationCase>(fields) {
                Ok(mut case) => {
                    case.id = id;
                    Some(case)
                }
                Err(e) => {
                    tracing::debug!("Skipping case {} with unexpected fields: {}", id, e);
                    None
                }
            }
        })
        .collect()
}

/// Decode `getLeaderboard`: a list of `{address, points}` records, a list of
/// `[address, points]` pairs, or an object mapping address to points.
/// Sorted by points, highest first.
pub fn parse_leaderboard(value: Value) -> Vec<ReputationEntry> {
    let mut entries: Vec<ReputationEntry> = match value {
        Value::Object(map) => map
            .into_iter()
            .map(|(address, points)| ReputationEntry {
                address,
                points: parse_points(&points),
            })
            .collect(),
        Value::Array(items) => items.into_iter().filter_map(leaderboard_entry).collect(),
        _ => Vec::new(),
    };
    entries.sort_by(|a, b| b.points.cmp(&a.points));
    entries
}

fn leaderboard_entry(item: Value) -> Option<ReputationEntry> {
    match item {
        Value::Object(map) => Some(ReputationEntry {
            address: map.get("address").and_then(scalar_to_string)?,
            points: map.get("points").map(parse_points).unwrap_or(0),
        }),
        Value::Array(pair) if pair.len() == 2 => Some(ReputationEntry {
            address: scalar_to_string(&pair[0])?,
            points: parse_points(&pair[1]),
        }),
        _ => None,
    }
}

/// Points arrive as JSON numbers or numeric strings. Anything unreadable
/// counts as zero.
pub fn parse_points(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Records may themselves be encoded as `[key, value]` pair lists.
fn pairs_to_object(fields: Value) -> Value {
    match fields {
        Value::Array(items)
            if items
                .iter()
                .all(|item| matches!(item, Value::Array(p) if p.len() == 2 && p[0].is_string())) =>
        {
            let map = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Array(mut pair) => {
                        let value = pair.pop()?;
                        let key = pair.pop()?.as_str()?.to_string();
                        Some((key, value))
                    }
                    _ => None,
                })
                .collect::<Map<String, Value>>();
            Value::Object(map)
        }
        other => other,
    }
}
