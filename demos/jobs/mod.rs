pub mod process_payment;
pub mod send_email;
