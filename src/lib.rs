pub mod components {
    pub mod buzzer;
    pub mod card_line;
    pub mod rfid;
    pub mod serial;
}
pub mod config;
pub mod effects;
pub mod logging;
pub mod scan_loop;
