use serde::{Deserialize, Serialize};
use std::fmt;

/// Path-finding algorithm requested from the routing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Astar,
    Dijkstra,
    Greedy,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Astar => write!(f, "astar"),
            Algorithm::Dijkstra => write!(f, "dijkstra"),
            Algorithm::Greedy => write!(f, "greedy"),
        }
    }
}

/// Body of a route request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub algo: Algorithm,
    pub src: String,
    pub dst: String,
}

/// One line of the routing service's event stream.
///
/// Exactly one field is expected to be set; unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_start: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<RouteComplete>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteComplete {
    #[serde(default)]
    pub result: Option<RouteOutcome>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteOutcome {
    #[serde(default)]
    pub path: Vec<String>,
}

impl RouteEvent {
    pub fn complete(path: Vec<String>) -> Self {
        Self {
            complete: Some(RouteComplete {
                result: Some(RouteOutcome { path }),
            }),
            ..Default::default()
        }
    }

    pub fn step(payload: serde_json::Value) -> Self {
        Self {
            step: Some(payload),
            ..Default::default()
        }
    }

    /// Final path carried by a complete event, empty when no path exists
    pub fn completed_path(&self) -> Option<&[String]> {
        self.complete.as_ref().map(|c| {
            c.result
                .as_ref()
                .map(|r| r.path.as_slice())
                .unwrap_or_default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let req = RouteRequest {
            algo: Algorithm::Greedy,
            src: "ground-1".into(),
            dst: "sat-2".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["algo"], "greedy");
        assert_eq!(json["src"], "ground-1");
    }

    #[test]
    fn test_event_parsing() {
        let step: RouteEvent = serde_json::from_str(r#"{"step":{"node":"B","cost":3}}"#).unwrap();
        assert!(step.step.is_some());
        assert!(step.completed_path().is_none());

        let done: RouteEvent =
            serde_json::from_str(r#"{"complete":{"result":{"path":["A","B","C"]}}}"#).unwrap();
        assert_eq!(done.completed_path().unwrap(), ["A", "B", "C"]);

        let empty: RouteEvent = serde_json::from_str(r#"{"complete":{}}"#).unwrap();
        assert_eq!(empty.completed_path().unwrap().len(), 0);

        let unknown: RouteEvent = serde_json::from_str(r#"{"heartbeat":1}"#).unwrap();
        assert!(unknown.completed_path().is_none());
    }
}
