//! Mapping from provider resources to record store rows

use calsync_domain::constants::GOOGLE_CONFERENCE_APP;
use calsync_domain::{
    composite_key, AttendeeRow, ColorPalette, ConferenceRow, EventResource, EventRow, ReminderRow,
};

/// Event row for a persistable resource; `None` when the id or timezone is
/// missing.
pub fn event_row(
    event: &EventResource,
    calendar_id: &str,
    user_id: &str,
    palette: Option<&ColorPalette>,
    now: &str,
) -> Option<EventRow> {
    if !event.is_persistable() {
        return None;
    }
    let event_id = event.event_id()?;
    let color = palette.and_then(|p| p.event_color(event.color_id.as_deref()));

    Some(EventRow {
        id: composite_key(event_id, calendar_id),
        event_id: event_id.to_string(),
        user_id: user_id.to_string(),
        calendar_id: calendar_id.to_string(),
        summary: event.summary.clone(),
        notes: event.description.clone(),
        location: event.location.clone(),
        status: event.status.clone(),
        start_date: event.start.raw().map(str::to_string),
        end_date: event.end.raw().map(str::to_string),
        all_day: event.is_all_day(),
        timezone: event.timezone().map(str::to_string),
        recurring_event_id: event.recurring_event_id.clone(),
        html_link: event.html_link.clone(),
        conference_id: conference_id(event).map(str::to_string),
        color_id: event.color_id.clone(),
        background_color: color.map(|c| c.background.clone()),
        foreground_color: color.map(|c| c.foreground.clone()),
        created_at: event.created.clone().unwrap_or_else(|| now.to_string()),
        updated_at: event.updated.clone().unwrap_or_else(|| now.to_string()),
    })
}

/// Attendees keyed by provider attendee id, falling back to the email.
pub fn attendee_rows(event: &EventResource, calendar_id: &str, user_id: &str) -> Vec<AttendeeRow> {
    let Some(event_key) = event.composite_key(calendar_id) else {
        return Vec::new();
    };

    event
        .attendees
        .iter()
        .filter_map(|attendee| {
            let identity = attendee.id.as_deref().or(attendee.email.as_deref())?;
            Some(AttendeeRow {
                id: composite_key(identity, &event_key),
                event_id: event_key.clone(),
                user_id: user_id.to_string(),
                name: attendee.display_name.clone(),
                email: attendee.email.clone(),
                response_status: attendee.response_status.clone(),
                optional: attendee.optional.unwrap_or(false),
                resource: attendee.resource.unwrap_or(false),
                organizer: attendee.organizer.unwrap_or(false),
                comment: attendee.comment.clone(),
                additional_guests: attendee.additional_guests.unwrap_or(0),
            })
        })
        .collect()
}

/// Reminder rows: a single marker row when the calendar default applies,
/// otherwise one row per override with non-negative minutes.
pub fn reminder_rows(event: &EventResource, calendar_id: &str, user_id: &str) -> Vec<ReminderRow> {
    let (Some(event_key), Some(reminders)) = (event.composite_key(calendar_id), &event.reminders)
    else {
        return Vec::new();
    };
    let timezone = event.timezone().map(str::to_string);

    if reminders.use_default {
        return vec![ReminderRow {
            id: composite_key("default", &event_key),
            event_id: event_key,
            user_id: user_id.to_string(),
            use_default: true,
            method: None,
            minutes: None,
            timezone,
        }];
    }

    reminders
        .overrides
        .iter()
        .filter(|o| o.minutes > -1)
        .map(|o| ReminderRow {
            id: composite_key(&format!("{}-{}", o.method, o.minutes), &event_key),
            event_id: event_key.clone(),
            user_id: user_id.to_string(),
            use_default: false,
            method: Some(o.method.clone()),
            minutes: Some(o.minutes),
            timezone: timezone.clone(),
        })
        .collect()
}

/// Conference row for events carrying conference data with an id.
pub fn conference_row(
    event: &EventResource,
    calendar_id: &str,
    user_id: &str,
) -> Option<ConferenceRow> {
    let data = event.conference_data.as_ref()?;
    let id = conference_id(event)?;
    let solution = data.conference_solution.as_ref();
    let entry_points = if data.entry_points.is_empty() {
        None
    } else {
        serde_json::to_string(&data.entry_points).ok()
    };

    Some(ConferenceRow {
        id: id.to_string(),
        user_id: user_id.to_string(),
        calendar_id: calendar_id.to_string(),
        event_id: event.composite_key(calendar_id),
        conference_type: solution.and_then(|s| s.key.as_ref()).map(|k| k.solution_type.clone()),
        name: solution.and_then(|s| s.name.clone()),
        icon_uri: solution.and_then(|s| s.icon_uri.clone()),
        entry_points,
        notes: data.notes.clone(),
        app: GOOGLE_CONFERENCE_APP.to_string(),
        is_host: false,
    })
}

fn conference_id(event: &EventResource) -> Option<&str> {
    event
        .conference_data
        .as_ref()
        .and_then(|data| data.conference_id.as_deref())
        .filter(|id| !id.is_empty())
}
