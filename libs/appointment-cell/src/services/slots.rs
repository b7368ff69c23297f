//! Expansion of recurring availability into concrete slots.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use shared_models::{
    clinic_closes_at, clinic_opens_at, day_of_week_index, is_clinic_day, Appointment, AvailabilitySlotTemplate,
    Doctor, Slot, SlotKey,
};

/// Start times a doctor offers on `date`.
///
/// Each matching template is stepped from its own start by the consultation
/// length; a slot is kept only when it lies wholly inside clinic hours and
/// inside the template. Weekends and dates before the doctor's schedule
/// opens yield nothing.
pub fn expand_day(doctor: &Doctor, templates: &[AvailabilitySlotTemplate], date: NaiveDate) -> Vec<NaiveTime> {
    expand_day_located(doctor, templates, date)
        .into_iter()
        .map(|(start, _)| start)
        .collect()
}

/// Like [`expand_day`], paired with the location of the template each start
/// came from. When templates overlap, the earliest-starting one wins.
pub fn expand_day_located(
    doctor: &Doctor,
    templates: &[AvailabilitySlotTemplate],
    date: NaiveDate,
) -> Vec<(NaiveTime, Option<Uuid>)> {
    if !doctor.active || !is_clinic_day(date) || !doctor.schedule_open_on(date) {
        return Vec::new();
    }

    let step = doctor.consultation_duration_minutes;
    if step == 0 {
        return Vec::new();
    }

    let weekday = day_of_week_index(date);
    let opens = minutes_of(clinic_opens_at());
    let closes = minutes_of(clinic_closes_at());

    let mut matching: Vec<&AvailabilitySlotTemplate> = templates
        .iter()
        .filter(|t| t.doctor_id == doctor.id && t.day_of_week == weekday)
        .collect();
    matching.sort_by_key(|t| t.start_time);

    let mut starts = BTreeMap::new();
    for template in matching {
        let end = minutes_of(template.end_time);
        let mut cursor = minutes_of(template.start_time);
        while cursor + step <= end {
            if cursor >= opens && cursor + step <= closes {
                starts.entry(cursor).or_insert(template.location_id);
            }
            cursor += step;
        }
    }

    starts
        .into_iter()
        .filter_map(|(minutes, location)| time_of(minutes).map(|t| (t, location)))
        .collect()
}

/// Free slots for one doctor on one day. Location names are left for the caller.
pub fn free_slots(
    doctor: &Doctor,
    templates: &[AvailabilitySlotTemplate],
    taken: &HashMap<SlotKey, u32>,
    date: NaiveDate,
    earliest: NaiveDateTime,
) -> Vec<Slot> {
    expand_day_located(doctor, templates, date)
        .into_iter()
        .filter(|(start, _)| date.and_time(*start) >= earliest)
        .map(|(start_time, location_id)| Slot {
            doctor_id: doctor.id,
            doctor_name: doctor.name.clone(),
            specialty_id: doctor.specialty_id,
            date,
            start_time,
            duration_minutes: doctor.consultation_duration_minutes,
            location_id,
            location_name: None,
        })
        .filter(|slot| taken.get(&slot.key()).copied().unwrap_or(0) < doctor.capacity_per_slot)
        .collect()
}

/// Scheduled bookings per slot.
pub fn occupancy<'a>(appointments: impl IntoIterator<Item = &'a Appointment>) -> HashMap<SlotKey, u32> {
    let mut taken = HashMap::new();
    for appointment in appointments.into_iter().filter(|a| a.is_scheduled()) {
        *taken.entry(appointment.slot_key()).or_insert(0) += 1;
    }
    taken
}

/// Date, then start time, then doctor name.
pub fn rank(slots: &mut [Slot]) {
    slots.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then(a.start_time.cmp(&b.start_time))
            .then_with(|| a.doctor_name.cmp(&b.doctor_name))
    });
}

/// Keeps, per date, the slots closest to `wanted` that are within `tolerance`.
pub fn nearest_to(slots: Vec<Slot>, wanted: NaiveTime, tolerance: Duration) -> Vec<Slot> {
    let distance = |slot: &Slot| (slot.start_time - wanted).num_minutes().abs();

    let mut best: HashMap<NaiveDate, i64> = HashMap::new();
    for slot in slots.iter().filter(|s| distance(s) <= tolerance.num_minutes()) {
        let d = distance(slot);
        best.entry(slot.date).and_modify(|b| *b = (*b).min(d)).or_insert(d);
    }

    slots
        .into_iter()
        .filter(|slot| best.get(&slot.date) == Some(&distance(slot)))
        .collect()
}

fn minutes_of(time: NaiveTime) -> u32 {
    (time - NaiveTime::MIN).num_minutes() as u32
}

fn time_of(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_utils::test_utils::{date, doctor, specialty, time};

    fn template(doctor: &Doctor, day: u8, start: NaiveTime, end: NaiveTime) -> AvailabilitySlotTemplate {
        AvailabilitySlotTemplate {
            id: Uuid::new_v4(),
            doctor_id: doctor.id,
            day_of_week: day,
            start_time: start,
            end_time: end,
            location_id: None,
        }
    }

    #[test]
    fn templates_cannot_widen_clinic_hours() {
        let cardio = specialty("Cardiologia", false);
        let doc = doctor("Dra. Ana Souza", &cardio, 1, 60);
        let templates: Vec<_> = (0..=6).map(|d| template(&doc, d, time(6, 0), time(21, 0))).collect();

        // 2026-10-12 is a Monday.
        let monday = expand_day(&doc, &templates, date(2026, 10, 12));
        assert_eq!(monday.first(), Some(&time(8, 0)));
        assert_eq!(monday.last(), Some(&time(17, 0)));
        assert_eq!(monday.len(), 10);

        assert!(expand_day(&doc, &templates, date(2026, 10, 17)).is_empty());
        assert!(expand_day(&doc, &templates, date(2026, 10, 18)).is_empty());
    }

    #[test]
    fn slots_must_fit_entirely() {
        let cardio = specialty("Cardiologia", false);
        let doc = doctor("Dr. Bruno Costa", &cardio, 1, 45);
        let templates = vec![template(&doc, 3, time(16, 0), time(18, 30))];

        let starts = expand_day(&doc, &templates, date(2026, 10, 14));
        assert_eq!(starts, vec![time(16, 0), time(16, 45)]);
    }

    #[test]
    fn schedule_opening_date_is_respected() {
        let cardio = specialty("Cardiologia", false);
        let mut doc = doctor("Dra. Ana Souza", &cardio, 1, 30);
        doc.schedule_opens_on = Some(date(2026, 10, 20));
        let templates: Vec<_> = (1..=5).map(|d| template(&doc, d, time(8, 0), time(9, 0))).collect();

        assert!(expand_day(&doc, &templates, date(2026, 10, 19)).is_empty());
        assert_eq!(expand_day(&doc, &templates, date(2026, 10, 20)).len(), 2);
    }

    #[test]
    fn nearest_keeps_closest_per_day_within_tolerance() {
        let cardio = specialty("Cardiologia", false);
        let doc = doctor("Dra. Ana Souza", &cardio, 2, 30);
        let templates = vec![template(&doc, 3, time(8, 0), time(12, 0))];
        let day = date(2026, 10, 14);
        let slots = free_slots(&doc, &templates, &HashMap::new(), day, day.and_time(time(0, 0)));

        let near = nearest_to(slots.clone(), time(10, 10), Duration::minutes(60));
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].start_time, time(10, 0));

        assert!(nearest_to(slots, time(15, 0), Duration::minutes(60)).is_empty());
    }

    #[test]
    fn full_slots_are_dropped() {
        let cardio = specialty("Cardiologia", false);
        let doc = doctor("Dra. Ana Souza", &cardio, 1, 30);
        let templates = vec![template(&doc, 3, time(8, 0), time(9, 0))];
        let day = date(2026, 10, 14);

        let mut taken = HashMap::new();
        taken.insert(
            SlotKey {
                doctor_id: doc.id,
                date: day,
                start_time: time(8, 0),
            },
            1,
        );

        let slots = free_slots(&doc, &templates, &taken, day, day.and_time(time(0, 0)));
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].start_time, time(8, 30));
    }

    #[test]
    fn slots_carry_their_template_location() {
        let cardio = specialty("Cardiologia", false);
        let doc = doctor("Dra. Ana Souza", &cardio, 1, 60);
        let centro = Uuid::new_v4();
        let norte = Uuid::new_v4();
        let mut morning = template(&doc, 3, time(8, 0), time(10, 0));
        morning.location_id = Some(centro);
        let mut afternoon = template(&doc, 3, time(14, 0), time(16, 0));
        afternoon.location_id = Some(norte);
        let day = date(2026, 10, 14);

        let slots = free_slots(&doc, &[afternoon, morning], &HashMap::new(), day, day.and_time(time(0, 0)));
        let located: Vec<_> = slots.iter().map(|s| (s.start_time, s.location_id)).collect();
        assert_eq!(
            located,
            vec![
                (time(8, 0), Some(centro)),
                (time(9, 0), Some(centro)),
                (time(14, 0), Some(norte)),
                (time(15, 0), Some(norte)),
            ]
        );
    }
}
