//! Demo terminal visualizer
//!
//! A stand-in for the canvas renderer: draws the six band energies as a
//! one-line meter and flashes the category of the most recent fired
//! event. Subscribes to the bus like any other renderer; the engine never
//! waits on it.

use crate::bands::FrequencyBands;
use crate::bus::{BusMessage, EventBus, SubscriberId};
use crate::pattern::EventCategory;
use crossterm::{
    cursor::MoveToColumn,
    execute,
    style::Print,
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// How long an event flash stays visible.
const FLASH_MS: u128 = 150;

/// Render one meter line: `sub ###--- bass ##---- ... | avg 0.42 [KICK]`.
pub fn format_meter(bands: &FrequencyBands, flash: Option<&str>, bar_width: usize) -> String {
    let mut line = String::new();
    for (label, value) in FrequencyBands::labels().iter().zip(bands.values()) {
        let filled = ((value * bar_width as f32).round() as usize).min(bar_width);
        line.push_str(label);
        line.push(' ');
        for i in 0..bar_width {
            line.push(if i < filled { '#' } else { '-' });
        }
        line.push(' ');
    }
    line.push_str(&format!("| avg {:.2}", bands.average));
    if let Some(tag) = flash {
        line.push_str(&format!(" [{tag}]"));
    }
    line
}

fn category_tag(category: EventCategory) -> &'static str {
    match category {
        EventCategory::Kick => "KICK",
        EventCategory::Snare => "SNARE",
        EventCategory::Hat => "HAT",
        EventCategory::Bass => "BASS",
        EventCategory::Tonal => "TONAL",
    }
}

struct VisualState {
    bands: FrequencyBands,
    flash: Option<(EventCategory, Instant)>,
}

/// Bus-driven band meter for the terminal.
pub struct TerminalVisualizer {
    bus: Arc<EventBus>,
    subscription: SubscriberId,
    state: Arc<Mutex<VisualState>>,
    bar_width: usize,
}

impl TerminalVisualizer {
    pub fn attach(bus: Arc<EventBus>) -> Self {
        let state = Arc::new(Mutex::new(VisualState {
            bands: FrequencyBands::default(),
            flash: None,
        }));

        let subscription = {
            let state = Arc::clone(&state);
            bus.subscribe(move |message| match message {
                BusMessage::SignalUpdated { bands, .. } => {
                    state.lock().unwrap().bands = *bands;
                }
                BusMessage::EventFired { event, .. } => {
                    state.lock().unwrap().flash = Some((event.category, Instant::now()));
                }
                BusMessage::PlaybackChanged { is_playing, .. } => {
                    if !is_playing {
                        let mut s = state.lock().unwrap();
                        s.bands = FrequencyBands::default();
                        s.flash = None;
                    }
                }
            })
        };

        Self {
            bus,
            subscription,
            state,
            bar_width: 8,
        }
    }

    /// Redraw the meter in place on the current line.
    pub fn draw(&self, out: &mut impl Write) -> io::Result<()> {
        let line = {
            let s = self.state.lock().unwrap();
            let flash = s
                .flash
                .filter(|(_, at)| at.elapsed().as_millis() < FLASH_MS)
                .map(|(category, _)| category_tag(category));
            format_meter(&s.bands, flash, self.bar_width)
        };
        execute!(
            out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(line)
        )?;
        out.flush()
    }

    pub fn detach(self) {
        self.bus.unsubscribe(self.subscription);
    }
}
