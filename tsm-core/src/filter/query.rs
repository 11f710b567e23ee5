use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde_json::{json, Map, Value};

use super::{FilterError, FilterSpec, TimeField};

/// One node of the `jsonFilter` tree understood by the contents search API.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    Range(RangeFilter),
    And(Vec<QueryFilter>),
    /// A node supplied verbatim by the user.
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeFilter {
    pub field: TimeField,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl QueryFilter {
    pub fn to_json(&self) -> Value {
        match self {
            QueryFilter::Range(range) => range.to_json(),
            QueryFilter::And(filters) => json!({
                "type": "and",
                "filters": filters.iter().map(QueryFilter::to_json).collect::<Vec<_>>(),
            }),
            QueryFilter::Raw(value) => value.clone(),
        }
    }
}

impl RangeFilter {
    fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("type".into(), Value::from("range"));
        object.insert("field".into(), Value::from(self.field.as_str()));
        if let Some(from) = &self.from {
            object.insert("from".into(), Value::from(from.as_str()));
            object.insert("include_lower".into(), Value::Bool(true));
        }
        if let Some(to) = &self.to {
            object.insert("to".into(), Value::from(to.as_str()));
            object.insert("include_upper".into(), Value::Bool(true));
        }
        Value::Object(object)
    }
}

/// Compiles the filter section of the configuration into a search filter anchored at `now`.
///
/// Clauses are ordered raw filter first, then `openTime`, `startTime` and
/// `liveEndTime`. No clause yields `None`, a single clause is returned as is,
/// and several are combined under an `and` node.
pub fn compile(
    spec: &FilterSpec,
    now: &DateTime<FixedOffset>,
) -> Result<Option<QueryFilter>, FilterError> {
    let mut clauses = Vec::new();
    if let Some(raw) = &spec.json_filter {
        clauses.push(QueryFilter::Raw(raw.clone()));
    }

    for field in TimeField::ALL {
        let range = spec.time_range(field);
        if range.is_empty() {
            continue;
        }
        let from = range
            .from
            .as_ref()
            .map(|offset| offset.resolve(now).map(format_timestamp))
            .transpose()?;
        let to = range
            .to
            .as_ref()
            .map(|offset| offset.resolve(now).map(format_timestamp))
            .transpose()?;
        clauses.push(QueryFilter::Range(RangeFilter { field, from, to }));
    }

    Ok(match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(QueryFilter::And(clauses)),
    })
}

fn format_timestamp(at: DateTime<FixedOffset>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{RelativeOffset, TimeRange};

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00.750+09:00").unwrap()
    }

    fn offset(text: &str) -> Option<RelativeOffset> {
        Some(RelativeOffset::parse(text).unwrap())
    }

    #[test]
    fn no_clauses_compiles_to_none() {
        let spec = FilterSpec::default();
        assert_eq!(compile(&spec, &now()).unwrap(), None);
    }

    #[test]
    fn single_time_family_is_not_wrapped() {
        let spec = FilterSpec {
            start_time: TimeRange {
                from: offset("1h"),
                to: offset("-30m"),
            },
            ..FilterSpec::default()
        };
        let compiled = compile(&spec, &now()).unwrap().unwrap();
        assert_eq!(
            compiled,
            QueryFilter::Range(RangeFilter {
                field: TimeField::StartTime,
                from: Some("2024-05-01T13:00:00+09:00".into()),
                to: Some("2024-05-01T11:30:00+09:00".into()),
            })
        );
        assert_eq!(
            compiled.to_json(),
            json!({
                "type": "range",
                "field": "startTime",
                "from": "2024-05-01T13:00:00+09:00",
                "include_lower": true,
                "to": "2024-05-01T11:30:00+09:00",
                "include_upper": true,
            })
        );
    }

    #[test]
    fn open_bound_has_no_inclusive_flag() {
        let spec = FilterSpec {
            live_end_time: TimeRange {
                from: None,
                to: offset("2d"),
            },
            ..FilterSpec::default()
        };
        let json = compile(&spec, &now()).unwrap().unwrap().to_json();
        let object = json.as_object().unwrap();
        assert_eq!(object["field"], "liveEndTime");
        assert_eq!(object["to"], "2024-05-03T12:00:00+09:00");
        assert!(!object.contains_key("from"));
        assert!(!object.contains_key("include_lower"));
    }

    #[test]
    fn raw_filter_comes_first_under_and() {
        let raw = json!({"type": "equal", "field": "providerType", "value": "official"});
        let spec = FilterSpec {
            json_filter: Some(raw.clone()),
            open_time: TimeRange {
                from: offset("-1d"),
                to: None,
            },
            ..FilterSpec::default()
        };
        match compile(&spec, &now()).unwrap().unwrap() {
            QueryFilter::And(children) => {
                assert_eq!(children.len(), 2);
                assert_eq!(children[0], QueryFilter::Raw(raw));
                assert!(matches!(
                    &children[1],
                    QueryFilter::Range(RangeFilter { field: TimeField::OpenTime, .. })
                ));
            }
            other => panic!("expected and node, got {other:?}"),
        }
    }

    #[test]
    fn families_keep_fixed_order() {
        let spec = FilterSpec {
            live_end_time: TimeRange {
                from: offset("0s"),
                to: None,
            },
            open_time: TimeRange {
                from: None,
                to: offset("1w"),
            },
            start_time: TimeRange {
                from: offset("1h"),
                to: None,
            },
            ..FilterSpec::default()
        };
        let json = compile(&spec, &now()).unwrap().unwrap().to_json();
        let fields: Vec<_> = json["filters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|node| node["field"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(fields, ["openTime", "startTime", "liveEndTime"]);
    }

    #[test]
    fn raw_filter_alone_is_returned_verbatim() {
        let raw = json!({"type": "or", "filters": []});
        let spec = FilterSpec {
            json_filter: Some(raw.clone()),
            ..FilterSpec::default()
        };
        assert_eq!(compile(&spec, &now()).unwrap().unwrap().to_json(), raw);
    }
}
