//! The hospital backend's resource routes.
//!
//! Base paths are spelled the way the backend's router prefixes are
//! configured, trailing slash included; `normalized_url` copes either way.

use crate::cache::ResourceKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Patients,
    Doctors,
    Appointments,
    Billing,
    Medicines,
    Sales,
    LabTests,
    LabReports,
    Records,
}

impl Endpoint {
    pub const ALL: [Endpoint; 9] = [
        Endpoint::Patients,
        Endpoint::Doctors,
        Endpoint::Appointments,
        Endpoint::Billing,
        Endpoint::Medicines,
        Endpoint::Sales,
        Endpoint::LabTests,
        Endpoint::LabReports,
        Endpoint::Records,
    ];

    /// Cache key shared by every view of this resource.
    pub fn key(&self) -> ResourceKey {
        ResourceKey::from(self.name())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Patients => "patients",
            Endpoint::Doctors => "doctors",
            Endpoint::Appointments => "appointments",
            Endpoint::Billing => "billing",
            Endpoint::Medicines => "medicines",
            Endpoint::Sales => "sales",
            Endpoint::LabTests => "labTests",
            Endpoint::LabReports => "labReports",
            Endpoint::Records => "records",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Endpoint::Patients => "/patients/",
            Endpoint::Doctors => "/doctors/",
            Endpoint::Appointments => "/appointments/",
            Endpoint::Billing => "/billing/",
            Endpoint::Medicines => "/pharmacy/medicines/",
            Endpoint::Sales => "/pharmacy/sales/",
            Endpoint::LabTests => "/lab/tests/",
            Endpoint::LabReports => "/lab/reports/",
            Endpoint::Records => "/records/",
        }
    }
}
