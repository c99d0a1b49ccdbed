//! Daily machine logbook and its derived fuel figures.
//!
//! All calculators are pure. An entry is only accepted when
//! [`LogbookReadings::validate`] returns an empty map.

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use fleetops_core::{AggregateId, DomainError, MachineId, SiteId, Stamp, UserId};
use fleetops_listing::Listable;

/// Field name -> message. Empty means valid.
pub type FieldErrors = BTreeMap<&'static str, String>;

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    // `+ 0.0` folds -0.0 into 0.0.
    (value * 100.0).round() / 100.0 + 0.0
}

/// Raw figures typed into a logbook form.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogbookReadings {
    pub opening_km: f64,
    pub closing_km: f64,
    pub opening_hrs: f64,
    pub closing_hrs: f64,
    /// Diesel in the tank at the start of the day.
    pub opening_balance: f64,
    pub diesel_issued: f64,
    /// Diesel in the tank at the end of the day.
    pub closing_balance: f64,
}

/// Values derived from [`LogbookReadings`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LogbookFigures {
    pub total_run_km: f64,
    pub total_run_hrs: f64,
    pub diesel_used: f64,
    pub avg_per_km: f64,
    pub avg_per_hr: f64,
}

impl LogbookReadings {
    // Differences are rounded to two decimals so binary residue such as
    // 0.1 + 0.7 - 0.8 reads as zero.

    pub fn total_run_km(&self) -> f64 {
        round2(self.closing_km - self.opening_km)
    }

    pub fn total_run_hrs(&self) -> f64 {
        round2(self.closing_hrs - self.opening_hrs)
    }

    pub fn diesel_used(&self) -> f64 {
        round2(self.opening_balance + self.diesel_issued - self.closing_balance)
    }

    /// Kilometres per unit of diesel, 0 when nothing ran or nothing burned.
    pub fn avg_per_km(&self) -> f64 {
        average(self.total_run_km(), self.diesel_used())
    }

    /// Hours per unit of diesel, 0 when nothing ran or nothing burned.
    pub fn avg_per_hr(&self) -> f64 {
        average(self.total_run_hrs(), self.diesel_used())
    }

    pub fn figures(&self) -> LogbookFigures {
        LogbookFigures {
            total_run_km: self.total_run_km(),
            total_run_hrs: self.total_run_hrs(),
            diesel_used: self.diesel_used(),
            avg_per_km: self.avg_per_km(),
            avg_per_hr: self.avg_per_hr(),
        }
    }

    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();

        let inputs = [
            ("opening_km", self.opening_km),
            ("closing_km", self.closing_km),
            ("opening_hrs", self.opening_hrs),
            ("closing_hrs", self.closing_hrs),
            ("opening_balance", self.opening_balance),
            ("diesel_issued", self.diesel_issued),
            ("closing_balance", self.closing_balance),
        ];
        for (field, value) in inputs {
            if !value.is_finite() {
                errors.insert(field, "must be a number".to_string());
            } else if value < 0.0 {
                errors.insert(field, "cannot be negative".to_string());
            }
        }
        if !errors.is_empty() {
            return errors;
        }

        if self.closing_km < self.opening_km {
            errors.insert(
                "closing_km",
                "closing odometer cannot be below the opening reading".to_string(),
            );
        }
        if self.closing_hrs < self.opening_hrs {
            errors.insert(
                "closing_hrs",
                "closing hour meter cannot be below the opening reading".to_string(),
            );
        }
        if self.diesel_used() < 0.0 {
            errors.insert(
                "closing_balance",
                format!(
                    "closing balance {} exceeds opening balance plus diesel issued ({})",
                    self.closing_balance,
                    round2(self.opening_balance + self.diesel_issued)
                ),
            );
        }
        errors
    }
}

fn average(run: f64, diesel_used: f64) -> f64 {
    if diesel_used > 0.0 && run > 0.0 {
        round2(run / diesel_used)
    } else {
        0.0
    }
}

/// Logbook entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogbookEntryId(pub AggregateId);

impl LogbookEntryId {
    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for LogbookEntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for LogbookEntryId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Form submission for one machine-day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogbookEntry {
    pub machine_id: MachineId,
    pub site_id: SiteId,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub readings: LogbookReadings,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Accepted logbook entry with its derived figures frozen in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogbookEntry {
    pub id: LogbookEntryId,
    pub machine_id: MachineId,
    pub site_id: SiteId,
    pub date: NaiveDate,
    pub readings: LogbookReadings,
    pub figures: LogbookFigures,
    #[serde(default)]
    pub operator: Option<String>,
    pub recorded: Stamp,
}

impl LogbookEntry {
    /// Accept a submission, or return the field errors that block it.
    pub fn submit(
        id: LogbookEntryId,
        new: NewLogbookEntry,
        recorded_by: UserId,
        at: DateTime<Utc>,
    ) -> Result<Self, FieldErrors> {
        let errors = new.readings.validate();
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            id,
            machine_id: new.machine_id,
            site_id: new.site_id,
            date: new.date,
            figures: new.readings.figures(),
            readings: new.readings,
            operator: new
                .operator
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty()),
            recorded: Stamp::new(recorded_by, at, new.notes),
        })
    }
}

impl Listable for LogbookEntry {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        let mut fields = Vec::new();
        if let Some(operator) = &self.operator {
            fields.push(Cow::Borrowed(operator.as_str()));
        }
        if let Some(notes) = &self.recorded.notes {
            fields.push(Cow::Borrowed(notes.as_str()));
        }
        fields
    }

    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "machine" => Some(Cow::Owned(self.machine_id.to_string())),
            "site" => Some(Cow::Owned(self.site_id.to_string())),
            "date" => Some(Cow::Owned(self.date.to_string())),
            _ => None,
        }
    }
}
