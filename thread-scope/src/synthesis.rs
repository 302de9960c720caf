//! Conversion of the raw events of each thread into drawable
//! intervals.
use crate::registry::{EventKind, RawEvent, ThreadDescriptor};
use crate::subtick::Step;

use thread_scope_api::{Interval, ThreadData, Window};

pub struct IntervalSynthesizer {
    start: f64,
    end: f64,
    tick_mark_divisor: u32,
}

impl IntervalSynthesizer {
    /// `window` spans the first and last timestamp of the capture.
    /// `tick_mark_divisor` sets how small the marks of partially logged
    /// threads are relative to their step.
    pub fn new(window: Option<Window>, tick_mark_divisor: u32) -> Self {
        let (start, end) = window
            .map(|w| (w.start as f64, w.end as f64))
            .unwrap_or((0.0, 0.0));
        Self {
            start,
            end,
            tick_mark_divisor: tick_mark_divisor.max(1),
        }
    }

    pub fn synthesize(&self, thread: &ThreadDescriptor) -> ThreadData {
        if thread.logged {
            self.logged(&thread.events)
        } else {
            self.partial(&thread.events)
        }
    }

    /// Pairs entries with the subsequent exit or deletion.
    fn logged(&self, events: &[RawEvent]) -> ThreadData {
        let mut events = events.to_vec();
        let mut exit_marker = None;

        if let Some(first) = events.first().copied().filter(RawEvent::is_closing) {
            if first.timestamp == 0 {
                // The first thread to run is never switched in.
                events.insert(
                    0,
                    RawEvent {
                        timestamp: 0,
                        kind: EventKind::In,
                        step: Step {
                            index: 0,
                            count: first.step.count,
                        },
                    },
                );
            } else {
                // Switched in before the trace window began.
                events.remove(0);
                if first.kind == EventKind::Exit {
                    exit_marker = Some(self.exit_marker(at(&first), first.step));
                }
            }
        }
        if events.len() % 2 == 1 {
            events.pop();
        }

        let mut intervals = vec![];
        let mut no_data_prefix = None;
        for pair in events.chunks_exact(2) {
            let (entry, exit) = (pair[0], pair[1]);
            let shift = entry.step.shift();
            let begin = entry.timestamp as f64 + shift;
            let mut width = exit.timestamp as f64 - entry.timestamp as f64 - shift;
            if width < 1.0 {
                width = entry.step.fraction();
            }
            let interval = Interval { begin, width };

            if intervals.is_empty() {
                no_data_prefix = self.no_data_prefix(begin);
            }
            if exit.kind == EventKind::Exit {
                exit_marker = Some(self.exit_marker(interval.end(), exit.step));
            }
            intervals.push(interval);
        }

        ThreadData::Logged {
            intervals,
            exit_marker,
            no_data_prefix,
        }
    }

    /// Marks each switch individually; no duration can be inferred.
    fn partial(&self, events: &[RawEvent]) -> ThreadData {
        let mut in_ticks = vec![];
        let mut out_ticks = vec![];
        let mut exit_marker = None;
        let mut first_mark: Option<f64> = None;

        for event in events {
            let width = event.step.fraction() / self.tick_mark_divisor as f64;
            let mark = match event.kind {
                EventKind::In => {
                    let mark = Interval {
                        begin: at(event),
                        width,
                    };
                    in_ticks.push(mark);
                    mark
                }
                EventKind::Out => {
                    let mark = Interval {
                        begin: (at(event) - width).max(0.0),
                        width,
                    };
                    out_ticks.push(mark);
                    mark
                }
                EventKind::Exit => {
                    exit_marker = Some(self.exit_marker(at(event), event.step));
                    continue;
                }
            };
            first_mark = Some(first_mark.map_or(mark.begin, |b| b.min(mark.begin)));
        }

        ThreadData::Partial {
            in_ticks,
            out_ticks,
            exit_marker,
            no_data_prefix: first_mark.and_then(|begin| self.no_data_prefix(begin)),
        }
    }

    /// Spans from a deletion to the end of the trace window. Never
    /// narrower than one step of the deleting tick.
    fn exit_marker(&self, from: f64, step: Step) -> Interval {
        Interval {
            begin: from,
            width: (self.end - from).max(step.fraction()),
        }
    }

    fn no_data_prefix(&self, until: f64) -> Option<Interval> {
        Some(Interval {
            begin: self.start,
            width: until - self.start,
        })
        .filter(|i| i.width > 0.0)
    }
}

/// Position of an event on the time axis.
fn at(event: &RawEvent) -> f64 {
    event.timestamp as f64 + event.step.shift()
}

/// Whether the thread has anything to draw besides markers.
pub fn has_visible_data(data: &ThreadData) -> bool {
    match data {
        ThreadData::Logged { intervals, .. } => !intervals.is_empty(),
        ThreadData::Partial {
            in_ticks,
            out_ticks,
            ..
        } => !in_ticks.is_empty() || !out_ticks.is_empty(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn event(timestamp: u64, kind: EventKind, index: u32, count: u32) -> RawEvent {
        RawEvent {
            timestamp,
            kind,
            step: Step { index, count },
        }
    }

    fn thread(logged: bool, events: Vec<RawEvent>) -> ThreadDescriptor {
        ThreadDescriptor {
            name: "t".into(),
            priority: 0,
            logged,
            events,
        }
    }

    fn window(start: u64, end: u64) -> Option<Window> {
        Some(Window { start, end })
    }

    #[test]
    fn first_thread_is_entered_at_boot() {
        let synth = IntervalSynthesizer::new(window(0, 9), 3);
        let data = synth.synthesize(&thread(
            true,
            vec![
                event(0, EventKind::Out, 0, 1),
                event(4, EventKind::In, 0, 1),
                event(9, EventKind::Out, 0, 1),
            ],
        ));

        assert_eq!(
            data,
            ThreadData::Logged {
                intervals: vec![
                    Interval {
                        begin: 0.0,
                        width: 1.0
                    },
                    Interval {
                        begin: 4.0,
                        width: 5.0
                    },
                ],
                exit_marker: None,
                no_data_prefix: None,
            }
        );
        assert!(has_visible_data(&data));
    }

    #[test]
    fn leading_exit_and_trailing_entry_are_trimmed() {
        let synth = IntervalSynthesizer::new(window(2, 20), 3);
        let data = synth.synthesize(&thread(
            true,
            vec![
                event(3, EventKind::Out, 0, 1),
                event(5, EventKind::In, 1, 2),
                event(8, EventKind::Out, 0, 1),
                event(12, EventKind::In, 0, 1),
            ],
        ));

        let ThreadData::Logged {
            intervals,
            no_data_prefix,
            ..
        } = data
        else {
            panic!("expected a logged thread");
        };
        assert_eq!(
            intervals,
            vec![Interval {
                begin: 5.5,
                width: 2.5
            }]
        );
        assert_eq!(
            no_data_prefix,
            Some(Interval {
                begin: 2.0,
                width: 3.5
            })
        );
    }

    #[test]
    fn same_tick_interval_is_clamped_to_its_step() {
        let synth = IntervalSynthesizer::new(window(7, 7), 3);
        let data = synth.synthesize(&thread(
            true,
            vec![event(7, EventKind::In, 1, 3), event(7, EventKind::Out, 2, 3)],
        ));
        let ThreadData::Logged { intervals, .. } = data else {
            panic!("expected a logged thread");
        };
        assert_eq!(
            intervals,
            vec![Interval {
                begin: 7.0 + 1.0 / 3.0,
                width: 1.0 / 3.0
            }]
        );
    }

    #[test]
    fn deletion_produces_exit_marker() {
        let synth = IntervalSynthesizer::new(window(0, 30), 3);
        let data = synth.synthesize(&thread(
            true,
            vec![event(4, EventKind::In, 0, 1), event(10, EventKind::Exit, 0, 1)],
        ));
        assert_eq!(
            data.exit_marker(),
            Some(&Interval {
                begin: 10.0,
                width: 20.0
            })
        );
        assert_eq!(
            data.no_data_prefix(),
            Some(&Interval {
                begin: 0.0,
                width: 4.0
            })
        );
    }

    #[test]
    fn deletion_of_thread_entered_before_window() {
        let synth = IntervalSynthesizer::new(window(0, 10), 3);
        let data = synth.synthesize(&thread(true, vec![event(4, EventKind::Exit, 0, 1)]));
        assert_eq!(
            data,
            ThreadData::Logged {
                intervals: vec![],
                exit_marker: Some(Interval {
                    begin: 4.0,
                    width: 6.0
                }),
                no_data_prefix: None,
            }
        );
        assert!(!has_visible_data(&data));
    }

    #[test]
    fn deletion_at_end_of_window_is_still_visible() {
        let synth = IntervalSynthesizer::new(window(0, 10), 3);
        let data = synth.synthesize(&thread(
            false,
            vec![event(10, EventKind::Exit, 1, 2)],
        ));
        assert_eq!(
            data.exit_marker(),
            Some(&Interval {
                begin: 10.5,
                width: 0.5
            })
        );
        assert!(!has_visible_data(&data));
    }

    #[test]
    fn partial_thread_marks() {
        let synth = IntervalSynthesizer::new(window(0, 12), 2);
        let data = synth.synthesize(&thread(
            false,
            vec![event(5, EventKind::In, 0, 1), event(8, EventKind::Out, 1, 2)],
        ));

        assert_eq!(
            data,
            ThreadData::Partial {
                in_ticks: vec![Interval {
                    begin: 5.0,
                    width: 0.5
                }],
                out_ticks: vec![Interval {
                    begin: 8.25,
                    width: 0.25
                }],
                exit_marker: None,
                no_data_prefix: Some(Interval {
                    begin: 0.0,
                    width: 5.0
                }),
            }
        );
    }

    #[test]
    fn widths_are_positive_and_begins_non_negative() {
        let synth = IntervalSynthesizer::new(window(0, 3), 3);
        for logged in [true, false] {
            let data = synth.synthesize(&thread(
                logged,
                vec![
                    event(0, EventKind::Out, 0, 2),
                    event(0, EventKind::In, 1, 2),
                    event(1, EventKind::Out, 0, 3),
                    event(1, EventKind::In, 2, 3),
                    event(3, EventKind::Exit, 0, 1),
                ],
            ));
            for interval in data.drawables() {
                assert!(interval.width > 0.0, "{:?}", interval);
                assert!(interval.begin >= 0.0, "{:?}", interval);
            }
        }
    }

    #[test]
    fn thread_without_events() {
        let synth = IntervalSynthesizer::new(None, 3);
        assert!(!has_visible_data(&synth.synthesize(&thread(true, vec![]))));
        assert!(!has_visible_data(&synth.synthesize(&thread(false, vec![]))));
    }
}
