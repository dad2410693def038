//! Training Center XML (TCX) reading and writing.
//!
//! Only the trackpoint data of a single activity is read. Elements are
//! matched by local name, so namespace prefixes are ignored.

use chrono::{SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::sample::{parse_time, Position, Sample};
use crate::TcxError;

pub const TCX_NAMESPACE: &str = "http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2";

// Trackpoints are only read below this path; courses and other tracks are skipped.
const ACTIVITY_TRACK: [&str; 4] = ["Activities", "Activity", "Lap", "Track"];

fn under_activity_track(path: &[String]) -> bool {
    path.len() >= ACTIVITY_TRACK.len()
        && path[path.len() - ACTIVITY_TRACK.len()..]
            .iter()
            .zip(ACTIVITY_TRACK)
            .all(|(open, expected)| open.as_str() == expected)
}

#[derive(Default)]
struct DocumentShape {
    root: bool,
    activities: usize,
    activity: usize,
    tracks_in_lap: usize,
}

impl DocumentShape {
    fn open(&mut self, name: &str, parent: Option<&str>) -> Result<(), TcxError> {
        match (parent, name) {
            (None, "TrainingCenterDatabase") => self.root = true,
            (Some("TrainingCenterDatabase"), "Activities") => {
                self.activities += 1;
                if self.activities > 1 {
                    return Err(TcxError::UnsupportedDocumentShape(
                        "more than one Activities element".into(),
                    ));
                }
            }
            (Some("Activities"), "Activity") => {
                self.activity += 1;
                if self.activity > 1 {
                    return Err(TcxError::UnsupportedDocumentShape(
                        "more than one Activity".into(),
                    ));
                }
            }
            (Some("Activity"), "Lap") => self.tracks_in_lap = 0,
            (Some("Lap"), "Track") => {
                self.tracks_in_lap += 1;
                if self.tracks_in_lap > 1 {
                    return Err(TcxError::UnsupportedDocumentShape(
                        "more than one Track in a Lap".into(),
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Default)]
struct PointBuilder {
    time: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    altitude: Option<f64>,
    distance: Option<f64>,
    heart_rate: Option<u16>,
    cadence: Option<u8>,
}

impl PointBuilder {
    fn assign(&mut self, parent: &str, leaf: &str, text: &str) -> Result<(), TcxError> {
        match (parent, leaf) {
            ("Trackpoint", "Time") => self.time = Some(text.to_string()),
            ("Position", "LatitudeDegrees") => self.latitude = Some(parse_number(leaf, text)?),
            ("Position", "LongitudeDegrees") => self.longitude = Some(parse_number(leaf, text)?),
            ("Trackpoint", "AltitudeMeters") => self.altitude = Some(parse_number(leaf, text)?),
            ("Trackpoint", "DistanceMeters") => self.distance = Some(parse_number(leaf, text)?),
            ("HeartRateBpm", "Value") => self.heart_rate = Some(parse_integer(leaf, text)?),
            ("Trackpoint", "Cadence") => self.cadence = Some(parse_integer(leaf, text)?),
            _ => {}
        }
        Ok(())
    }

    fn build(self) -> Result<Sample, TcxError> {
        let raw = self
            .time
            .ok_or_else(|| TcxError::UnparseableTimestamp(String::new()))?;
        let mut sample = Sample::new(parse_time(&raw)?);
        if let (Some(lat), Some(lon)) = (self.latitude, self.longitude) {
            sample = sample.with_position(lat, lon);
        }
        if let Some(distance) = self.distance {
            sample = sample.with_distance(distance);
        }
        if let Some(bpm) = self.heart_rate {
            sample = sample.with_heart_rate(bpm);
        }
        sample.altitude_meters = self.altitude;
        sample.cadence = self.cadence;
        Ok(sample)
    }
}

fn parse_number(field: &str, text: &str) -> Result<f64, TcxError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TcxError::Parse(format!("invalid {field}: {text:?}")))
}

fn parse_integer<T: TryFrom<i64>>(field: &str, text: &str) -> Result<T, TcxError> {
    let value = parse_number(field, text)?;
    T::try_from(value.floor() as i64)
        .map_err(|_| TcxError::Parse(format!("{field} out of range: {text:?}")))
}

/// Parse the trackpoints of a single-activity TCX document, in document order.
///
/// Laps are concatenated. More than one activity, or more than one track
/// within a lap, is rejected. Trackpoints outside the activity (courses) are
/// skipped.
pub fn parse_tcx(input: &[u8]) -> Result<Vec<Sample>, TcxError> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut shape = DocumentShape::default();
    let mut current: Option<PointBuilder> = None;
    // Text of the innermost open element, possibly split across events.
    let mut text = String::new();
    let mut samples = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            TcxError::Parse(format!("at byte {}: {}", reader.buffer_position(), e))
        })?;
        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                shape.open(&name, path.last().map(String::as_str))?;
                if name == "Trackpoint" && under_activity_track(&path) {
                    current = Some(PointBuilder::default());
                }
                path.push(name);
                text.clear();
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                shape.open(&name, path.last().map(String::as_str))?;
            }
            Event::Text(t) => {
                if current.is_some() {
                    let fragment = t
                        .unescape()
                        .map_err(|e| TcxError::Parse(e.to_string()))?;
                    text.push_str(&fragment);
                }
            }
            Event::CData(c) => {
                if current.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                if let (Some(point), [.., parent, leaf]) = (current.as_mut(), path.as_slice()) {
                    point.assign(parent, leaf, &text)?;
                }
                text.clear();
                if path.pop().as_deref() == Some("Trackpoint") {
                    if let Some(point) = current.take() {
                        samples.push(point.build()?);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !shape.root {
        return Err(TcxError::Parse(
            "missing TrainingCenterDatabase root element".into(),
        ));
    }
    if shape.activity == 0 {
        return Err(TcxError::UnsupportedDocumentShape(
            "document contains no Activity".into(),
        ));
    }
    Ok(samples)
}

/// Envelope settings for [`write_tcx`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentOptions {
    pub sport: String,
    pub activity_id: String,
}

impl DocumentOptions {
    pub fn new(sport: impl Into<String>, activity_id: impl Into<String>) -> Self {
        Self {
            sport: sport.into(),
            activity_id: activity_id.into(),
        }
    }

    /// Options with a new identifier taken from the current time.
    pub fn fresh(sport: impl Into<String>) -> Self {
        Self::new(sport, Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true))
    }
}

type XmlWriter = Writer<Vec<u8>>;

fn emit(writer: &mut XmlWriter, event: Event<'_>) -> Result<(), TcxError> {
    writer
        .write_event(event)
        .map_err(|e| TcxError::Write(e.to_string()))
}

fn open(writer: &mut XmlWriter, name: &str) -> Result<(), TcxError> {
    emit(writer, Event::Start(BytesStart::new(name)))
}

fn close(writer: &mut XmlWriter, name: &str) -> Result<(), TcxError> {
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn leaf(writer: &mut XmlWriter, name: &str, value: &str) -> Result<(), TcxError> {
    open(writer, name)?;
    emit(writer, Event::Text(BytesText::new(value)))?;
    close(writer, name)
}

fn write_trackpoint(writer: &mut XmlWriter, sample: &Sample) -> Result<(), TcxError> {
    open(writer, "Trackpoint")?;
    leaf(
        writer,
        "Time",
        &sample.time().to_rfc3339_opts(SecondsFormat::AutoSi, true),
    )?;
    if let Some(Position {
        latitude_degrees,
        longitude_degrees,
    }) = sample.position.get()
    {
        open(writer, "Position")?;
        leaf(writer, "LatitudeDegrees", &latitude_degrees.to_string())?;
        leaf(writer, "LongitudeDegrees", &longitude_degrees.to_string())?;
        close(writer, "Position")?;
    }
    if let Some(altitude) = sample.altitude_meters {
        leaf(writer, "AltitudeMeters", &altitude.to_string())?;
    }
    if let Some(distance) = sample.distance_meters.get() {
        leaf(writer, "DistanceMeters", &distance.to_string())?;
    }
    if let Some(bpm) = sample.heart_rate_bpm.get() {
        open(writer, "HeartRateBpm")?;
        leaf(writer, "Value", &bpm.to_string())?;
        close(writer, "HeartRateBpm")?;
    }
    if let Some(cadence) = sample.cadence {
        leaf(writer, "Cadence", &cadence.to_string())?;
    }
    close(writer, "Trackpoint")
}

/// Serialize `samples` as a single-activity, single-lap TCX document.
pub fn write_tcx(samples: &[Sample], options: &DocumentOptions) -> Result<String, TcxError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))),
    )?;
    emit(
        &mut writer,
        Event::Start(
            BytesStart::new("TrainingCenterDatabase").with_attributes([("xmlns", TCX_NAMESPACE)]),
        ),
    )?;
    open(&mut writer, "Activities")?;
    emit(
        &mut writer,
        Event::Start(BytesStart::new("Activity").with_attributes([("Sport", options.sport.as_str())])),
    )?;
    leaf(&mut writer, "Id", &options.activity_id)?;

    let mut lap = BytesStart::new("Lap");
    if let Some(first) = samples.first() {
        let start = first.time().to_rfc3339_opts(SecondsFormat::AutoSi, true);
        lap.push_attribute(("StartTime", start.as_str()));
    }
    emit(&mut writer, Event::Start(lap))?;
    open(&mut writer, "Track")?;
    for sample in samples {
        write_trackpoint(&mut writer, sample)?;
    }
    close(&mut writer, "Track")?;
    close(&mut writer, "Lap")?;
    close(&mut writer, "Activity")?;
    close(&mut writer, "Activities")?;
    close(&mut writer, "TrainingCenterDatabase")?;

    String::from_utf8(writer.into_inner()).map_err(|e| TcxError::Write(e.to_string()))
}
