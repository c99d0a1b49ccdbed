//! Payment slips recorded against procurements.

use std::borrow::Cow;
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use fleetops_core::{AggregateId, DomainError, DomainResult, Stamp, UserId, require_text};
use fleetops_listing::Listable;

use crate::procurement::{Procurement, ProcurementId, ProcurementStatus};

/// Payment slip identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub AggregateId);

impl PaymentId {
    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for PaymentId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Cheque,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cheque => "cheque",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::BankTransfer => "Bank transfer",
            PaymentMethod::Cheque => "Cheque",
        }
    }
}

/// Payment as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPaymentSlip {
    pub slip_no: String,
    pub procurement_id: ProcurementId,
    pub payee: String,
    /// Minor currency units.
    pub amount: i64,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    pub paid_on: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSlip {
    pub id: PaymentId,
    pub slip_no: String,
    pub procurement_id: ProcurementId,
    pub payee: String,
    pub amount: i64,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    pub paid_on: NaiveDate,
    pub recorded: Stamp,
}

impl PaymentSlip {
    /// Record a payment against `procurement`, which must be approved or
    /// received. `already_paid` is the sum of earlier slips for it.
    pub fn record(
        id: PaymentId,
        new: NewPaymentSlip,
        procurement: &Procurement,
        already_paid: i64,
        recorded_by: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        require_text("slip_no", &new.slip_no)?;
        require_text("payee", &new.payee)?;
        if new.amount <= 0 {
            return Err(DomainError::validation("amount must be positive"));
        }
        if procurement.id_typed() != new.procurement_id {
            return Err(DomainError::invariant("procurement_id mismatch"));
        }
        if procurement.status() == ProcurementStatus::Draft {
            return Err(DomainError::conflict(
                "payments can only be recorded for approved procurements",
            ));
        }
        let outstanding = procurement.total() - already_paid;
        if new.amount > outstanding {
            return Err(DomainError::conflict(format!(
                "payment of {} exceeds the outstanding {}",
                format_amount(new.amount),
                format_amount(outstanding.max(0))
            )));
        }
        if new.method != PaymentMethod::Cash
            && new.reference.as_deref().is_none_or(|r| r.trim().is_empty())
        {
            return Err(DomainError::validation(
                "a reference is required for bank transfers and cheques",
            ));
        }

        Ok(Self {
            id,
            slip_no: new.slip_no.trim().to_string(),
            procurement_id: new.procurement_id,
            payee: new.payee.trim().to_string(),
            amount: new.amount,
            method: new.method,
            reference: new
                .reference
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            paid_on: new.paid_on,
            recorded: Stamp::new(recorded_by, at, new.notes),
        })
    }

    /// Suggested file name for the downloadable slip.
    pub fn file_name(&self) -> String {
        let safe: String = self
            .slip_no
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("payment-slip-{safe}.txt")
    }

    /// Plain-text slip served by the download endpoint.
    pub fn render_text(&self, procurement: &Procurement) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "PAYMENT SLIP {}", self.slip_no);
        let _ = writeln!(out, "{}", "=".repeat(40));
        let _ = writeln!(out, "Paid on:      {}", self.paid_on);
        let _ = writeln!(out, "Payee:        {}", self.payee);
        let _ = writeln!(out, "Amount:       {}", format_amount(self.amount));
        let _ = writeln!(out, "Method:       {}", self.method.label());
        if let Some(reference) = &self.reference {
            let _ = writeln!(out, "Reference:    {reference}");
        }
        let _ = writeln!(
            out,
            "Procurement:  {} ({})",
            procurement.procurement_no(),
            procurement.vendor()
        );
        let _ = writeln!(out, "Order total:  {}", format_amount(procurement.total()));
        if let Some(notes) = &self.recorded.notes {
            let _ = writeln!(out, "Notes:        {notes}");
        }
        let _ = writeln!(out, "{}", "-".repeat(40));
        let _ = writeln!(out, "Recorded by {} at {}", self.recorded.by, self.recorded.at.to_rfc3339());
        out
    }
}

impl Listable for PaymentSlip {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        let mut fields = vec![
            Cow::Borrowed(self.slip_no.as_str()),
            Cow::Borrowed(self.payee.as_str()),
        ];
        if let Some(reference) = &self.reference {
            fields.push(Cow::Borrowed(reference.as_str()));
        }
        fields
    }

    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "method" => Some(Cow::Borrowed(self.method.as_str())),
            "procurement" => Some(Cow::Owned(self.procurement_id.to_string())),
            _ => None,
        }
    }
}

/// Minor units to `1,234.50`.
pub fn format_amount(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    let major = (abs / 100).to_string();
    let mut grouped = String::with_capacity(major.len() + major.len() / 3);
    for (i, c) in major.chars().enumerate() {
        if i > 0 && (major.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}.{:02}", abs % 100)
}
