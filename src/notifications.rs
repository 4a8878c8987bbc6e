//! Email reminder requests for events and subtasks.
//!
//! The client only assembles the request; the server owns scheduling and
//! delivery. Reminders always run on Bangkok time (UTC+7, no DST).

use chrono::{DateTime, Days, FixedOffset, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::validation::ValidationError;

/// Time zone every reminder is scheduled in.
pub const NOTIFICATION_TIMEZONE: &str = "Asia/Bangkok";

const BANGKOK_OFFSET_SECS: i32 = 7 * 3600;

fn bangkok() -> FixedOffset {
  FixedOffset::east_opt(BANGKOK_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Wall-clock time in Bangkok for a UTC instant.
pub fn to_bangkok(instant: DateTime<Utc>) -> NaiveDateTime {
  instant.with_timezone(&bangkok()).naive_local()
}

/// A fixed offset maps every local time to exactly one instant.
fn from_bangkok(local: NaiveDateTime) -> DateTime<Utc> {
  bangkok()
    .from_local_datetime(&local)
    .earliest()
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or_else(|| local.and_utc())
}

/// Time of day, written `HH:MM` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay {
  hour: u8,
  minute: u8,
}

impl TimeOfDay {
  pub fn new(hour: u8, minute: u8) -> Result<Self, ValidationError> {
    if hour > 23 || minute > 59 {
      return Err(ValidationError::InvalidTimeOfDay(format!(
        "{:02}:{:02}",
        hour, minute
      )));
    }
    Ok(Self { hour, minute })
  }

  pub fn hour(&self) -> u8 {
    self.hour
  }

  pub fn minute(&self) -> u8 {
    self.minute
  }

  fn as_naive(&self) -> NaiveTime {
    NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0).unwrap_or(NaiveTime::MIN)
  }
}

impl Default for TimeOfDay {
  fn default() -> Self {
    Self { hour: 9, minute: 0 }
  }
}

impl fmt::Display for TimeOfDay {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:02}:{:02}", self.hour, self.minute)
  }
}

impl FromStr for TimeOfDay {
  type Err = ValidationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || ValidationError::InvalidTimeOfDay(s.to_string());

    let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
    if hour.len() != 2 || minute.len() != 2 {
      return Err(invalid());
    }
    let hour: u8 = hour.parse().map_err(|_| invalid())?;
    let minute: u8 = minute.parse().map_err(|_| invalid())?;

    Self::new(hour, minute).map_err(|_| invalid())
  }
}

impl Serialize for TimeOfDay {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for TimeOfDay {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

/// Body of a reminder request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
  pub recipient_ids: Vec<String>,
  pub days_before: u32,
  pub time: TimeOfDay,
  pub timezone: &'static str,
}

impl NotificationRequest {
  /// Recipients are de-duplicated, keeping first-seen order.
  pub fn new(
    recipient_ids: impl IntoIterator<Item = String>,
    days_before: u32,
    time: TimeOfDay,
  ) -> Result<Self, ValidationError> {
    let mut unique: Vec<String> = Vec::new();
    for id in recipient_ids {
      if !id.trim().is_empty() && !unique.contains(&id) {
        unique.push(id);
      }
    }
    if unique.is_empty() {
      return Err(ValidationError::NoRecipients);
    }

    Ok(Self {
      recipient_ids: unique,
      days_before,
      time,
      timezone: NOTIFICATION_TIMEZONE,
    })
  }

  /// When the server will send the reminder for something due at `target`:
  /// `days_before` calendar days earlier in Bangkok, at `time`.
  ///
  /// Display only; the server decides the actual send time.
  pub fn send_at(&self, target: DateTime<Utc>) -> DateTime<Utc> {
    let local_day = to_bangkok(target).date();
    let send_day = local_day
      .checked_sub_days(Days::new(u64::from(self.days_before)))
      .unwrap_or(local_day);
    from_bangkok(send_day.and_time(self.time.as_naive()))
  }
}

/// Server reply to a reminder request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStatus {
  #[serde(default)]
  pub success: bool,
  #[serde(default, alias = "error")]
  pub message: Option<String>,
  #[serde(default)]
  pub notification_id: Option<String>,
  #[serde(default)]
  pub scheduled_for: Option<DateTime<Utc>>,
}
