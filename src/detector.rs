use crate::state::RemoteState;

/// A track change that calls for a new transcode
#[derive(Debug, Clone, PartialEq)]
pub struct Resync {
    pub track_id: String,
    pub start_offset: f64,
}

/// Decide whether the latest state requires a resync
///
/// Only a change of track identity triggers; seeking within the same track
/// does not. An unavailable state never triggers.
pub fn detect(last_track: Option<&str>, state: Option<&RemoteState>) -> Option<Resync> {
    let state = state?;
    if last_track == Some(state.track_id.as_str()) {
        return None;
    }

    Some(Resync {
        track_id: state.track_id.clone(),
        start_offset: state.position_seconds,
    })
}
