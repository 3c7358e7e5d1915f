fn main() {
    // Device builds need the ESP-IDF link arguments; host builds have none.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
