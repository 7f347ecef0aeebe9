//! Paths of the DentalNow REST API, relative to the configured base URL.

// ===== Auth =====

pub const AUTH_TOKEN: &str = "/auth/token";
pub const AUTH_REGISTER: &str = "/auth/register";
pub const AUTH_ME: &str = "/auth/me";
pub const AUTH_REFRESH: &str = "/auth/refresh";

// ===== Clinics =====

pub const CLINICS: &str = "/clinics";
pub const SEARCH_CLINICS: &str = "/clinics/search";

pub fn clinic_detail(id: &str) -> String {
    format!("/clinics/{}", id)
}

pub fn clinic_doctors(clinic_id: &str) -> String {
    format!("/clinics/{}/doctors", clinic_id)
}

pub fn clinic_services(clinic_id: &str) -> String {
    format!("/clinics/{}/services", clinic_id)
}

pub fn clinic_reviews(clinic_id: &str) -> String {
    format!("/clinics/{}/reviews", clinic_id)
}

pub fn clinic_dashboard(clinic_id: &str) -> String {
    format!("/clinics/{}/dashboard", clinic_id)
}

// ===== Doctors and services =====

pub const DOCTORS: &str = "/doctors";
pub const SERVICES: &str = "/services";

// ===== Appointments =====

pub const APPOINTMENTS: &str = "/appointments";
pub const AVAILABLE_SLOTS: &str = "/appointments/available-slots";

pub fn appointment_detail(id: &str) -> String {
    format!("/appointments/{}", id)
}

pub fn cancel_appointment(id: &str) -> String {
    format!("/appointments/{}/cancel", id)
}

// ===== Calls =====

pub const INITIATE_CALL: &str = "/calls/initiate";
pub const SEND_SMS: &str = "/calls/send-sms";
pub const RECENT_CALLS: &str = "/calls/recent";

// ===== Payments =====

pub const CREATE_PAYMENT_INTENT: &str = "/payments/create-intent";
pub const CONFIRM_PAYMENT: &str = "/payments/confirm";

// ===== Reviews =====

pub const REVIEWS: &str = "/reviews";
