use serde::{Deserialize, Serialize};

/// Read/write bucket an operation type counts towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCategory {
    Read,
    Write,
}

impl OpCategory {
    pub const ALL: [OpCategory; 2] = [OpCategory::Read, OpCategory::Write];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpCategory::Read => "Read",
            OpCategory::Write => "Write",
        }
    }
}

/// Operation types reported per namespace by `top`, with their bucket.
/// Lock wait times are deliberately unclassified.
pub const CATEGORY_TABLE: &[(&str, Option<OpCategory>)] = &[
    ("Total", None),
    ("ReadLock", None),
    ("WriteLock", None),
    ("Queries", Some(OpCategory::Read)),
    ("GetMore", Some(OpCategory::Read)),
    ("Insert", Some(OpCategory::Write)),
    ("Update", Some(OpCategory::Write)),
    ("Remove", Some(OpCategory::Write)),
    ("Commands", Some(OpCategory::Read)),
];

pub fn category_of(op_type: &str) -> Option<OpCategory> {
    CATEGORY_TABLE
        .iter()
        .find(|(name, _)| *name == op_type)
        .and_then(|(_, category)| *category)
}

/// Microsecond time and operation count, as reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OpStat {
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub count: f64,
}

impl OpStat {
    pub fn new(time: f64, count: f64) -> Self {
        Self { time, count }
    }

    pub fn seconds(&self) -> f64 {
        micros_to_seconds(self.time)
    }
}

pub fn micros_to_seconds(micros: f64) -> f64 {
    micros / 1e6
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpSeries {
    pub op_type: String,
    pub seconds: f64,
    pub count: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketTotals {
    pub seconds: f64,
    pub count: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub read: BucketTotals,
    pub write: BucketTotals,
}

impl CategoryTotals {
    pub fn get(&self, category: OpCategory) -> BucketTotals {
        match category {
            OpCategory::Read => self.read,
            OpCategory::Write => self.write,
        }
    }

    fn bucket_mut(&mut self, category: OpCategory) -> &mut BucketTotals {
        match category {
            OpCategory::Read => &mut self.read,
            OpCategory::Write => &mut self.write,
        }
    }
}

/// Accumulates read/write totals across any number of per-operation maps
/// (one per namespace for `top`).
#[derive(Debug, Default)]
pub struct CategoryAggregator {
    totals: CategoryTotals,
}

impl CategoryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts one per-operation map to per-op series and folds the
    /// classified entries into the running bucket totals.
    pub fn add<'a, I>(&mut self, per_op: I) -> Vec<OpSeries>
    where
        I: IntoIterator<Item = (&'a str, OpStat)>,
    {
        per_op
            .into_iter()
            .map(|(op_type, stat)| {
                let seconds = stat.seconds();
                if let Some(category) = category_of(op_type) {
                    let bucket = self.totals.bucket_mut(category);
                    bucket.seconds += seconds;
                    bucket.count += stat.count;
                }
                OpSeries {
                    op_type: op_type.to_string(),
                    seconds,
                    count: stat.count,
                }
            })
            .collect()
    }

    pub fn totals(&self) -> CategoryTotals {
        self.totals
    }

    pub fn aggregate<'a, I>(per_op: I) -> (Vec<OpSeries>, CategoryTotals)
    where
        I: IntoIterator<Item = (&'a str, OpStat)>,
    {
        let mut aggregator = Self::new();
        let series = aggregator.add(per_op);
        (series, aggregator.totals())
    }
}
