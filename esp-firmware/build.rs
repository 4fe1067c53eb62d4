// Build-Script: Wird vor dem Kompilieren ausgeführt
//
// - lädt WLAN- und Cloud-Einstellungen aus `.env` (siehe .env.example)
// - prüft Pflichtwerte früh, mit lesbarer Meldung statt env!-Fehler
// - setzt die Linker-Skripte für defmt und das ESP32-C6 Memory-Layout

/// Muss gesetzt sein, sonst bricht der Build ab
const REQUIRED: [&str; 4] = ["WIFI_SSID", "WIFI_PASSWORD", "CLOUD_HOST", "CLOUD_CLIENT_ID"];

/// Optional, sonst Standard-Port aus config.rs
const OPTIONAL: [&str; 2] = ["CLOUD_MQTT_PORT", "CLOUD_TCP_PORT"];

fn main() {
    // Fehlt .env, müssen die Werte als Environment-Variablen gesetzt sein
    if let Err(e) = dotenvy::dotenv() {
        println!("cargo:warning=.env nicht geladen ({e}), nutze Environment-Variablen");
    }
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-changed=partitions.csv");

    let mut missing = Vec::new();
    for key in REQUIRED.iter().chain(OPTIONAL.iter()) {
        println!("cargo:rerun-if-env-changed={key}");
        match std::env::var(key) {
            Ok(value) => println!("cargo:rustc-env={key}={value}"),
            Err(_) if REQUIRED.contains(key) => missing.push(*key),
            Err(_) => {}
        }
    }
    if !missing.is_empty() {
        println!("cargo:warning=Fehlende Einstellungen: {}", missing.join(", "));
    }

    for key in OPTIONAL {
        if let Ok(value) = std::env::var(key)
            && value.parse::<u16>().is_err()
        {
            println!("cargo:warning={key}={value} ist kein gültiger Port, Standard wird genutzt");
        }
    }

    // defmt.x: Symbole für das binäre Log-Format
    println!("cargo:rustc-link-arg=-Tdefmt.x");
    // linkall.x: Flash/RAM-Layout und Startup-Code, muss als letztes kommen
    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
