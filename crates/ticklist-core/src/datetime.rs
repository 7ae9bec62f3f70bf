use chrono::{
  DateTime,
  Local,
  NaiveDateTime,
  SecondsFormat,
  SubsecRound,
  TimeZone,
  Utc
};

/// Wall-clock format shared by `createdAt` and `deadlineSetAt`.
pub const STAMP_FORMAT: &str =
  "%Y-%m-%d %H:%M:%S";

/// Local wall-clock stamp for `now`, truncated to whole seconds.
#[must_use]
pub fn local_stamp(
  now: DateTime<Local>
) -> NaiveDateTime {
  now.naive_local().trunc_subsecs(0)
}

#[must_use]
pub fn format_stamp(
  stamp: NaiveDateTime
) -> String {
  stamp.format(STAMP_FORMAT).to_string()
}

/// Resolves a local wall-clock stamp to an instant. Ambiguous stamps
/// (DST fold) take the earlier instant; stamps inside a DST gap yield
/// `None`.
#[must_use]
pub fn stamp_to_utc(
  stamp: NaiveDateTime
) -> Option<DateTime<Utc>> {
  Local
    .from_local_datetime(&stamp)
    .earliest()
    .map(|dt| dt.with_timezone(&Utc))
}

/// Deadlines are kept at millisecond precision so they survive a
/// serialize/deserialize cycle unchanged.
#[must_use]
pub fn deadline_instant(
  dt: DateTime<Utc>
) -> DateTime<Utc> {
  dt.trunc_subsecs(3)
}

#[must_use]
pub fn format_deadline(
  dt: DateTime<Utc>
) -> String {
  dt.to_rfc3339_opts(
    SecondsFormat::Millis,
    true
  )
}

pub mod stamp_serde {
  use chrono::NaiveDateTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  use super::STAMP_FORMAT;

  pub fn serialize<S>(
    stamp: &NaiveDateTime,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &stamp
        .format(STAMP_FORMAT)
        .to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDateTime, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    NaiveDateTime::parse_from_str(
      raw.trim(),
      STAMP_FORMAT
    )
    .map_err(serde::de::Error::custom)
  }

  pub mod option {
    use chrono::NaiveDateTime;
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      stamp: &Option<NaiveDateTime>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match stamp {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<NaiveDateTime>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt {
        | Some(raw) => {
          NaiveDateTime::parse_from_str(
            raw.trim(),
            super::super::STAMP_FORMAT
          )
          .map(Some)
          .map_err(
            serde::de::Error::custom
          )
        }
        | None => Ok(None)
      }
    }
  }
}

pub mod deadline_serde {
  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          serializer.serialize_str(
            &super::super::format_deadline(
              *value
            )
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<DateTime<Utc>>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt {
        | Some(raw) => {
          DateTime::parse_from_rfc3339(
            raw.trim()
          )
          .map(|dt| {
            Some(
              super::super::deadline_instant(
                dt.with_timezone(&Utc)
              )
            )
          })
          .map_err(
            serde::de::Error::custom
          )
        }
        | None => Ok(None)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    format_deadline,
    format_stamp
  };

  #[test]
  fn formats_stamp_with_seconds() {
    let stamp =
      NaiveDate::from_ymd_opt(2024, 3, 9)
        .and_then(|d| {
          d.and_hms_opt(7, 5, 2)
        })
        .expect("valid stamp");
    assert_eq!(
      format_stamp(stamp),
      "2024-03-09 07:05:02"
    );
  }

  #[test]
  fn formats_deadline_like_iso_string() {
    let dt = Utc
      .with_ymd_and_hms(
        2024, 5, 1, 10, 0, 0
      )
      .single()
      .expect("valid deadline");
    assert_eq!(
      format_deadline(dt),
      "2024-05-01T10:00:00.000Z"
    );
  }
}
