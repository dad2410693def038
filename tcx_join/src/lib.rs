//! Merge two TCX activity recordings into one track, filling missing
//! position, distance and heart-rate readings by linear interpolation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod interpolate;
pub mod merge;
pub mod metric;
pub mod sample;
pub mod tcx;

pub use interpolate::ensure_metric;
pub use merge::{merge, merge_tracks, MergeMode, MergeReport, Merged, MetricPresence};
pub use metric::Metric;
pub use sample::{MetricSlot, Position, Sample};
pub use tcx::{parse_tcx, write_tcx, DocumentOptions};

#[derive(Error, Debug)]
pub enum TcxError {
    #[error("unsupported document shape: {0}")]
    UnsupportedDocumentShape(String),
    #[error("invalid mode `{0}`: mode must be one of: only-during-gps, union")]
    InvalidMode(String),
    #[error("only-during-gps selected but no sample carries a position")]
    UndefinedRangeBounds,
    #[error("unparseable timestamp: {0:?}")]
    UnparseableTimestamp(String),
    #[error("failed to parse TCX document: {0}")]
    Parse(String),
    #[error("failed to write TCX document: {0}")]
    Write(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinParams {
    pub mode: MergeMode,
    pub sport: String,
    pub activity_id: Option<String>,
}

impl Default for JoinParams {
    fn default() -> Self {
        Self {
            mode: MergeMode::Union,
            sport: "Running".to_string(),
            activity_id: None,
        }
    }
}

impl JoinParams {
    pub fn document_options(&self) -> DocumentOptions {
        match self.activity_id.as_ref() {
            Some(id) => DocumentOptions::new(self.sport.clone(), id.clone()),
            None => DocumentOptions::fresh(self.sport.clone()),
        }
    }
}

/// Output of [`join_tracks`] and [`join_documents`].
#[derive(Clone, Debug)]
pub struct Joined {
    pub document: String,
    pub report: MergeReport,
}

/// Merge two parsed tracks and serialize the result.
pub fn join_tracks(
    a: Vec<Sample>,
    b: Vec<Sample>,
    params: &JoinParams,
) -> Result<Joined, TcxError> {
    let merged = merge_tracks(a, b, params.mode)?;
    let document = write_tcx(&merged.samples, &params.document_options())?;
    Ok(Joined {
        document,
        report: merged.report,
    })
}

/// Parse two TCX documents, merge them and serialize the result.
pub fn join_documents(a: &[u8], b: &[u8], params: &JoinParams) -> Result<Joined, TcxError> {
    join_tracks(parse_tcx(a)?, parse_tcx(b)?, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2">
  <Activities><Activity Sport="Running"><Id>a</Id><Lap StartTime="2015-05-01T07:00:00Z"><Track>
    <Trackpoint><Time>2015-05-01T07:00:00Z</Time><Position><LatitudeDegrees>47.0</LatitudeDegrees><LongitudeDegrees>8.0</LongitudeDegrees></Position><DistanceMeters>0</DistanceMeters></Trackpoint>
    <Trackpoint><Time>2015-05-01T07:00:20Z</Time><Position><LatitudeDegrees>47.2</LatitudeDegrees><LongitudeDegrees>8.2</LongitudeDegrees></Position><DistanceMeters>100</DistanceMeters></Trackpoint>
  </Track></Lap></Activity></Activities>
</TrainingCenterDatabase>"#;

    const B: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2">
  <Activities><Activity Sport="Running"><Id>b</Id><Lap StartTime="2015-05-01T06:59:50Z"><Track>
    <Trackpoint><Time>2015-05-01T06:59:50Z</Time><HeartRateBpm><Value>110</Value></HeartRateBpm></Trackpoint>
    <Trackpoint><Time>2015-05-01T07:00:10Z</Time><HeartRateBpm><Value>130</Value></HeartRateBpm></Trackpoint>
    <Trackpoint><Time>2015-05-01T07:00:30Z</Time><HeartRateBpm><Value>150</Value></HeartRateBpm></Trackpoint>
  </Track></Lap></Activity></Activities>
</TrainingCenterDatabase>"#;

    #[test]
    fn test_join_documents_union() {
        let params = JoinParams {
            activity_id: Some("joined".to_string()),
            ..JoinParams::default()
        };
        let joined = join_documents(A.as_bytes(), B.as_bytes(), &params).unwrap();
        assert_eq!(joined.report.output, 5);
        let samples = parse_tcx(joined.document.as_bytes()).unwrap();
        assert_eq!(samples.len(), 5);
        // 07:00:10 is bracketed by both A samples.
        let mid = &samples[2];
        assert_eq!(mid.distance_meters.get(), Some(&50.0));
        let p = mid.position.get().unwrap();
        assert!((p.latitude_degrees - 47.1).abs() < 1e-9);
        assert_eq!(mid.heart_rate_bpm.get(), Some(&130));
        // 07:00:00 gets heart rate from B: 110 + 0.5 * 20.
        assert_eq!(samples[1].heart_rate_bpm.get(), Some(&120));
        assert!(joined.document.contains("<Id>joined</Id>"));
    }

    #[test]
    fn test_join_documents_only_during_gps() {
        let params = JoinParams {
            mode: MergeMode::OnlyDuringGps,
            ..JoinParams::default()
        };
        let joined = join_documents(A.as_bytes(), B.as_bytes(), &params).unwrap();
        assert_eq!(joined.report.output, 3);
        assert_eq!(joined.report.dropped_before, 1);
        assert_eq!(joined.report.dropped_after, 1);
    }

    #[test]
    fn test_join_tracks_matches_documents() {
        let params = JoinParams {
            activity_id: Some("same".to_string()),
            ..JoinParams::default()
        };
        let a = parse_tcx(A.as_bytes()).unwrap();
        let b = parse_tcx(B.as_bytes()).unwrap();
        let from_tracks = join_tracks(a, b, &params).unwrap();
        let from_documents = join_documents(A.as_bytes(), B.as_bytes(), &params).unwrap();
        assert_eq!(from_tracks.document, from_documents.document);
        assert_eq!(from_tracks.report, from_documents.report);
    }

    #[test]
    fn test_report_serializes() {
        let report = MergeReport::default();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "Union");
        assert_eq!(json["presence"]["position"], false);
    }
}
