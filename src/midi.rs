use crossbeam_channel::Sender;
use midir::{Ignore, MidiInput, MidiInputConnection};

use shadermidi_engine::control::ControlEvent;
use shadermidi_engine::{logi, logw};

/// Open the preferred (or first) input port. Decoded events go to `tx`;
/// `None` when there is no usable port, which is not an error.
pub fn connect_midi(preferred_device_contains: Option<&str>, tx: Sender<ControlEvent>) -> Option<MidiInputConnection<()>> {
    let mut midi_in = match MidiInput::new("shadermidi") {
        Ok(m) => m,
        Err(e) => {
            logw!("MIDI", "MIDI unavailable: {e}");
            return None;
        }
    };
    midi_in.ignore(Ignore::All);

    let ports = midi_in.ports();
    if ports.is_empty() {
        logi!("MIDI", "no MIDI input ports detected; running without MIDI");
        return None;
    }

    for (i, p) in ports.iter().enumerate() {
        if let Ok(name) = midi_in.port_name(p) {
            logi!("MIDI", "port {i}: {name}");
        }
    }

    let preferred = preferred_device_contains.map(str::to_lowercase).filter(|s| !s.is_empty());
    let mut chosen = ports.first().cloned();
    if let Some(pref) = preferred {
        match ports.iter().find(|p| {
            midi_in
                .port_name(p)
                .map(|n| n.to_lowercase().contains(&pref))
                .unwrap_or(false)
        }) {
            Some(p) => chosen = Some(p.clone()),
            None => logw!("MIDI", "no port matches '{pref}', using the first port"),
        }
    }

    let in_port = chosen?;
    let port_name = midi_in.port_name(&in_port).unwrap_or_else(|_| "Unknown".into());
    logi!("MIDI", "connecting input: {port_name}");

    let conn = midi_in.connect(
        &in_port,
        "shadermidi-in",
        move |_ts, msg, _| {
            if let Some(ev) = ControlEvent::from_midi(msg) {
                // The receiver only goes away at shutdown.
                let _ = tx.send(ev);
            }
        },
        (),
    );

    match conn {
        Ok(c) => Some(c),
        Err(e) => {
            logw!("MIDI", "failed to connect MIDI input: {e}");
            None
        }
    }
}
