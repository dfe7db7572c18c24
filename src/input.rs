use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Action {
    Quit,
    Next,
    Previous,
    Jump(usize),
    ToggleAutoplay,
    ToggleHelp,
}

#[derive(Clone, Debug)]
pub(crate) struct InputEvent {
    pub(crate) key: KeyCode,
    pub(crate) mods: KeyModifiers,
}

/// Resizes are picked up by the terminal on the next frame; only key
/// presses are collected here.
pub(crate) fn collect_input_nonblocking(max_frame_time: Duration) -> anyhow::Result<Vec<InputEvent>> {
    let mut out = Vec::new();

    let timeout = std::cmp::min(Duration::from_millis(1), max_frame_time);
    while event::poll(timeout)? {
        if let Event::Key(k) = event::read()? {
            if k.kind == KeyEventKind::Press || k.kind == KeyEventKind::Repeat {
                out.push(InputEvent {
                    key: k.code,
                    mods: k.modifiers,
                });
                if out.len() >= 32 {
                    break;
                }
            }
        }
    }
    Ok(out)
}

pub(crate) fn map_event_to_action(ev: &InputEvent) -> Option<Action> {
    if matches!(ev.key, KeyCode::Char('c') | KeyCode::Char('C'))
        && ev.mods.contains(KeyModifiers::CONTROL)
    {
        return Some(Action::Quit);
    }
    match ev.key {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(Action::Quit),
        KeyCode::Char(' ') | KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Right => {
            Some(Action::Next)
        }
        KeyCode::Left => Some(Action::Previous),
        KeyCode::Char(ch @ '1'..='9') => Some(Action::Jump(ch as usize - '1' as usize)),
        KeyCode::Char('a') | KeyCode::Char('A') => Some(Action::ToggleAutoplay),
        KeyCode::Char('h') | KeyCode::Char('H') => Some(Action::ToggleHelp),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> InputEvent {
        InputEvent {
            key: code,
            mods: KeyModifiers::NONE,
        }
    }

    #[test]
    fn digits_jump_zero_based() {
        assert_eq!(map_event_to_action(&key(KeyCode::Char('1'))), Some(Action::Jump(0)));
        assert_eq!(map_event_to_action(&key(KeyCode::Char('9'))), Some(Action::Jump(8)));
        assert_eq!(map_event_to_action(&key(KeyCode::Char('0'))), None);
    }

    #[test]
    fn navigation_keys() {
        assert_eq!(map_event_to_action(&key(KeyCode::Char(' '))), Some(Action::Next));
        assert_eq!(map_event_to_action(&key(KeyCode::Right)), Some(Action::Next));
        assert_eq!(map_event_to_action(&key(KeyCode::Left)), Some(Action::Previous));
        assert_eq!(map_event_to_action(&key(KeyCode::Esc)), Some(Action::Quit));
    }

    #[test]
    fn ctrl_c_quits() {
        let ev = InputEvent {
            key: KeyCode::Char('c'),
            mods: KeyModifiers::CONTROL,
        };
        assert_eq!(map_event_to_action(&ev), Some(Action::Quit));
    }
}
