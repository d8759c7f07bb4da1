//! Record identity and the hospital DTOs.
//!
//! # Design
//! The cache and binder only ever look at a record's `id`. Everything else a
//! record carries is the concern of whoever renders it, so the core is
//! generic over `Record` and the DTOs below are plain serde structs that
//! mirror the backend's schemas. Dates and times stay as the strings the
//! backend sends; nothing in the core interprets them.

use std::fmt;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Anything a resource list can hold.
pub trait Record: Clone + Send + Sync + DeserializeOwned + 'static {
    type Id: fmt::Display + Eq + Hash + Clone + Send + Sync;

    fn id(&self) -> &Self::Id;

    /// Human-facing name, used by `NameLookup`.
    fn label(&self) -> Option<&str> {
        None
    }
}

/// A backend identifier: either a string (UUIDs here) or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{n}"),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId::Text(value)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Number(value)
    }
}

/// A record whose fields other than `id` are left untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRecord {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record for JsonRecord {
    type Id = RecordId;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn label(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Patients
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPatient {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

// ---------------------------------------------------------------------------
// Doctors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub room_no: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDoctor {
    pub name: String,
    pub specialization: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_no: Option<String>,
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: RecordId,
    pub patient_id: String,
    #[serde(default)]
    pub doctor_id: Option<String>,
    pub appointment_date: String,
    #[serde(default)]
    pub appointment_time: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAppointment {
    pub patient_id: String,
    pub doctor_id: Option<String>,
    pub appointment_date: String,
    pub appointment_time: Option<String>,
}

// ---------------------------------------------------------------------------
// Medical records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: RecordId,
    pub patient_id: String,
    #[serde(default)]
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub prescription: Option<String>,
    #[serde(default)]
    pub visit_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMedicalRecord {
    pub patient_id: String,
    pub doctor_id: Option<String>,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
}

// ---------------------------------------------------------------------------
// Billing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: RecordId,
    pub patient_id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub total_amount: f64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBill {
    pub patient_id: String,
    pub description: Option<String>,
    pub total_amount: f64,
    #[serde(default = "pending")]
    pub status: Option<String>,
}

fn pending() -> Option<String> {
    Some("pending".to_string())
}

// ---------------------------------------------------------------------------
// Pharmacy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub batch_no: Option<String>,
    pub stock: i64,
    pub price: f64,
    #[serde(default)]
    pub expiry_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMedicine {
    pub name: String,
    pub batch_no: Option<String>,
    pub stock: i64,
    pub price: f64,
    pub expiry_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacySale {
    pub id: RecordId,
    #[serde(default)]
    pub patient_id: Option<String>,
    pub medicine_id: String,
    pub quantity: i64,
    pub total_amount: f64,
    #[serde(default)]
    pub sale_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPharmacySale {
    pub patient_id: Option<String>,
    pub medicine_id: String,
    pub quantity: i64,
}

// ---------------------------------------------------------------------------
// Lab
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabTest {
    pub id: RecordId,
    pub test_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub charges: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLabTest {
    pub test_name: String,
    pub description: Option<String>,
    pub charges: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabReport {
    pub id: RecordId,
    pub patient_id: String,
    #[serde(default)]
    pub doctor_id: Option<String>,
    pub test_id: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub test_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLabReport {
    pub patient_id: String,
    pub doctor_id: Option<String>,
    pub test_id: String,
}

/// Body for the `PATCH {base}/{id}/status` endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

/// Body for `PATCH /lab/reports/{id}/result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultUpdate {
    pub result: String,
}

macro_rules! impl_record {
    ($($ty:ty, $record:ident => $label:expr;)*) => {
        $(
            impl Record for $ty {
                type Id = RecordId;

                fn id(&self) -> &RecordId {
                    &self.id
                }

                fn label(&self) -> Option<&str> {
                    let $record = self;
                    $label
                }
            }
        )*
    };
}

impl_record! {
    Patient, p => Some(p.name.as_str());
    Doctor, d => Some(d.name.as_str());
    Appointment, _a => None;
    MedicalRecord, r => r.diagnosis.as_deref();
    Bill, b => b.description.as_deref();
    Medicine, m => Some(m.name.as_str());
    PharmacySale, _s => None;
    LabTest, t => Some(t.test_name.as_str());
    LabReport, r => r.status.as_deref();
}
