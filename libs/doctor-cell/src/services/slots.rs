// libs/doctor-cell/src/services/slots.rs
//
// Slot calendar generation: weekly template + per-date leave overrides +
// consultation duration -> the day's ordered bookable slots.

use chrono::{Datelike, NaiveDate};

use shared_utils::TimeRange;

use crate::models::{DaySchedule, Doctor, DoctorError, Slot};

/// Generate the full slot calendar for one doctor on one date.
///
/// Deterministic for fixed inputs. A date whose weekday has no template
/// entry yields an empty calendar.
pub fn slots_for_date(doctor: &Doctor, date: NaiveDate) -> Result<Vec<Slot>, DoctorError> {
    doctor.validate()?;

    let day = doctor.availability.day(date.weekday());
    Ok(day_slots(
        day,
        doctor.leave_for(date),
        doctor.average_consulting_minutes,
    ))
}

/// Step every `duration_minutes` through each session window.
///
/// A position is excluded only when its own `[start, start + duration)`
/// range intersects a leave interval; later positions keep their start
/// times and ordinals rather than re-packing to fill the gap.
pub fn day_slots(
    day: Option<&DaySchedule>,
    leaves: &[TimeRange],
    duration_minutes: u16,
) -> Vec<Slot> {
    let Some(day) = day else {
        return vec![];
    };

    let mut slots = Vec::new();
    let mut ordinal: i32 = 0;

    for (session_index, window) in day.sessions.iter().enumerate() {
        let mut cursor = window.start;
        while cursor.minutes() as u32 + duration_minutes as u32 <= window.end.minutes() as u32 {
            let occupied = TimeRange {
                start: cursor,
                end: cursor.plus_minutes(duration_minutes as i64),
            };
            if !leaves.iter().any(|leave| leave.intersects(&occupied)) {
                slots.push(Slot {
                    session_index: session_index as i32,
                    global_slot_index: ordinal,
                    start: cursor,
                });
            }
            ordinal += 1;
            cursor = cursor.plus_minutes(duration_minutes as i64);
        }
    }

    slots
}

/// The subset of a day's slots belonging to one session, order preserved.
pub fn session_slots(slots: &[Slot], session_index: i32) -> Vec<Slot> {
    slots
        .iter()
        .copied()
        .filter(|slot| slot.session_index == session_index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_utils::ClockTime;

    fn t(hour: u16, minute: u16) -> ClockTime {
        ClockTime::new(hour, minute).unwrap()
    }

    fn range(start: (u16, u16), end: (u16, u16)) -> TimeRange {
        TimeRange::new(t(start.0, start.1), t(end.0, end.1)).unwrap()
    }

    fn day(sessions: Vec<TimeRange>) -> DaySchedule {
        DaySchedule { sessions }
    }

    #[test]
    fn one_hour_session_with_20_minute_step() {
        let schedule = day(vec![range((9, 0), (10, 0))]);
        let slots = day_slots(Some(&schedule), &[], 20);

        let starts: Vec<String> = slots.iter().map(|s| s.start.to_wire()).collect();
        assert_eq!(starts, vec!["09:00", "09:20", "09:40"]);
        assert_eq!(
            slots.iter().map(|s| s.global_slot_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(slots.iter().all(|s| s.session_index == 0));
    }

    #[test]
    fn deterministic_and_unique_within_session() {
        let schedule = day(vec![range((9, 0), (12, 0)), range((17, 0), (19, 30))]);
        let first = day_slots(Some(&schedule), &[], 15);
        let second = day_slots(Some(&schedule), &[], 15);
        assert_eq!(first, second);

        for window in first.windows(2) {
            assert!(window[0].start < window[1].start || window[0].session_index != window[1].session_index);
        }
    }

    #[test]
    fn global_index_spans_sessions() {
        let schedule = day(vec![range((9, 0), (10, 0)), range((17, 0), (18, 0))]);
        let slots = day_slots(Some(&schedule), &[], 30);

        assert_eq!(slots.len(), 4);
        assert_eq!(slots[2].session_index, 1);
        assert_eq!(slots[2].global_slot_index, 2);
        assert_eq!(slots[2].start.to_wire(), "17:00");
    }

    #[test]
    fn session_shorter_than_duration_yields_nothing() {
        let schedule = day(vec![range((9, 0), (9, 15))]);
        assert!(day_slots(Some(&schedule), &[], 20).is_empty());
    }

    #[test]
    fn leave_covering_a_session_blanks_it() {
        let schedule = day(vec![range((9, 0), (10, 0)), range((17, 0), (18, 0))]);
        let leave = vec![range((9, 0), (10, 0))];
        let slots = day_slots(Some(&schedule), &leave, 20);

        assert!(slots.iter().all(|s| s.session_index == 1));
        assert_eq!(slots.len(), 3);
    }

    #[test]
    fn partial_leave_removes_intersecting_positions_without_repacking() {
        // 09:00-11:00, 30-minute step, leave 09:45-10:15 knocks out the
        // 09:30 and 10:00 positions; 10:30 keeps its start and ordinal.
        let schedule = day(vec![range((9, 0), (11, 0))]);
        let leave = vec![range((9, 45), (10, 15))];
        let slots = day_slots(Some(&schedule), &leave, 30);

        let kept: Vec<(i32, String)> = slots
            .iter()
            .map(|s| (s.global_slot_index, s.start.to_wire()))
            .collect();
        assert_eq!(
            kept,
            vec![
                (0, "09:00".to_string()),
                (3, "10:30".to_string()),
            ]
        );
    }

    #[test]
    fn ordinals_are_stable_under_overrides() {
        let schedule = day(vec![range((9, 0), (11, 0))]);
        let open = day_slots(Some(&schedule), &[], 30);
        let blocked = day_slots(Some(&schedule), &[range((9, 30), (10, 0))], 30);

        for slot in &blocked {
            let same = open
                .iter()
                .find(|s| s.global_slot_index == slot.global_slot_index)
                .unwrap();
            assert_eq!(same.start, slot.start);
        }
    }

    #[test]
    fn empty_leave_list_is_a_noop() {
        let schedule = day(vec![range((9, 0), (10, 0))]);
        assert_eq!(
            day_slots(Some(&schedule), &[], 20),
            day_slots(Some(&schedule), &Vec::new(), 20)
        );
    }

    #[test]
    fn no_template_entry_means_no_slots() {
        assert!(day_slots(None, &[], 20).is_empty());
    }
}
