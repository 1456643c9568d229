//! Offer/answer pairing between one viewer and one streamer, plus ICE relay.
//!
//! Every function here runs with the registry lock held by the caller, so a
//! check and the mutation that follows it are never interleaved with another
//! connection's message.

use crate::{
    error::SignalError,
    protocol::{IceCandidate, SessionDescription},
    registry::{ConnectionHandle, ConnectionId, PeerRegistry},
};

/// A frame to forward unchanged to another peer.
#[derive(Debug, Clone)]
pub struct Relay {
    pub to: ConnectionHandle,
    pub frame: String,
}

/// Result of an ICE relay attempt. An unknown sender is reported but does
/// not stop delivery.
#[derive(Debug)]
pub struct IceOutcome {
    pub sender_error: Option<SignalError>,
    pub relay: Result<Relay, SignalError>,
}

/// Viewer `offer.uuid` asks streamer `offer.to` to pair. On success both
/// records point at each other and the frame goes to the streamer.
pub fn offer(
    registry: &mut PeerRegistry,
    from: ConnectionId,
    offer: &SessionDescription,
    frame: &str,
) -> Result<Relay, SignalError> {
    let viewer = registry
        .owned_viewer(from, &offer.uuid)
        .ok_or(SignalError::NoViewer)?;
    if viewer.paired_streamer.is_some() {
        return Err(SignalError::ViewerBusy);
    }

    let streamer = registry
        .streamer(&offer.to)
        .ok_or(SignalError::StreamerNotFound)?;
    if streamer.paired_viewer.is_some() {
        return Err(SignalError::StreamerBusy);
    }
    let to = streamer.connection.clone();

    if !registry.pair(&offer.uuid, &offer.to) {
        return Err(SignalError::StreamerBusy);
    }

    Ok(Relay {
        to,
        frame: frame.to_string(),
    })
}

/// Streamer `answer.uuid` answers the viewer it is already paired with.
/// Pairing is left as it is.
pub fn answer(
    registry: &PeerRegistry,
    from: ConnectionId,
    answer: &SessionDescription,
    frame: &str,
) -> Result<Relay, SignalError> {
    let streamer = registry
        .owned_streamer(from, &answer.uuid)
        .ok_or(SignalError::StreamerNotFound)?;
    if streamer.paired_viewer.as_ref() != Some(&answer.to) {
        return Err(SignalError::StreamerBusy);
    }

    let viewer = registry.viewer(&answer.to).ok_or(SignalError::NoViewer)?;
    if viewer.paired_streamer.as_ref() != Some(&answer.uuid) {
        return Err(SignalError::ViewerBusy);
    }

    Ok(Relay {
        to: viewer.connection.clone(),
        frame: frame.to_string(),
    })
}

/// Candidates are relayed between any two registered peers regardless of
/// pairing, so ones gathered before the answer lands are not lost.
pub fn ice_candidate(
    registry: &PeerRegistry,
    from: ConnectionId,
    candidate: &IceCandidate,
    frame: &str,
) -> IceOutcome {
    let sender_known = registry.owned_streamer(from, &candidate.uuid).is_some()
        || registry.owned_viewer(from, &candidate.uuid).is_some();

    let relay = registry
        .connection_for(&candidate.to)
        .map(|to| Relay {
            to: to.clone(),
            frame: frame.to_string(),
        })
        .ok_or(SignalError::RecipientNotFound);

    IceOutcome {
        sender_error: (!sender_known).then_some(SignalError::UnregisteredSender),
        relay,
    }
}
