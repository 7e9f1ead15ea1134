//! Vital-sign simulator
//!
//! Usage: simulator [PATIENTS] [ROUNDS] [INTERVAL_MS]
//!
//! Posts one batch of INSERT records per round to a running server. Each
//! patient drifts around a fixed baseline; now and then a reading spikes past
//! a clinical limit.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const FIRST_NAMES: &[&str] = &["Mario", "Anna", "Luca", "Giulia", "Marco", "Sara", "Paolo", "Elena", "Davide", "Chiara"];
const LAST_NAMES: &[&str] = &["Rossi", "Bianchi", "Romano", "Colombo", "Ricci", "Marino", "Greco", "Bruno", "Gallo", "Conti"];

/// Chance that a reading carries an out-of-range value
const SPIKE_PROBABILITY: f64 = 0.05;
/// Chance that a metric is not measured this cycle
const MISSING_PROBABILITY: f64 = 0.03;

struct Patient {
    id: String,
    name: String,
    heart_rate: f64,
    bp_systolic: f64,
    bp_diastolic: f64,
    spo2: f64,
    temperature: f64,
    status: &'static str,
}

impl Patient {
    fn generate(index: usize, rng: &mut StdRng) -> Self {
        Self {
            id: format!("PT{:05}", index + 1),
            name: format!(
                "{} {}",
                FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())],
                LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())]
            ),
            heart_rate: rng.gen_range(60.0..95.0),
            bp_systolic: rng.gen_range(105.0..140.0),
            bp_diastolic: rng.gen_range(65.0..90.0),
            spo2: rng.gen_range(94.0..99.5),
            temperature: rng.gen_range(36.2..37.4),
            status: "stable",
        }
    }

    fn reading(&mut self, rng: &mut StdRng) -> Value {
        let mut heart_rate = self.heart_rate + rng.gen_range(-6.0..6.0);
        let mut bp_systolic = self.bp_systolic + rng.gen_range(-8.0..8.0);
        let bp_diastolic = self.bp_diastolic + rng.gen_range(-5.0..5.0);
        let mut spo2 = (self.spo2 + rng.gen_range(-1.5..1.0)).min(100.0);
        let mut temperature = self.temperature + rng.gen_range(-0.3..0.3);

        if rng.gen_bool(SPIKE_PROBABILITY) {
            match rng.gen_range(0..5) {
                0 => heart_rate = rng.gen_range(115.0..160.0),
                1 => heart_rate = rng.gen_range(30.0..44.0),
                2 => bp_systolic = rng.gen_range(165.0..210.0),
                3 => spo2 = rng.gen_range(78.0..89.0),
                _ => temperature = rng.gen_range(38.6..40.5),
            }
            self.status = "critical";
        }

        let mut metric = |value: f64, decimals: i32| -> Value {
            if rng.gen_bool(MISSING_PROBABILITY) {
                Value::Null
            } else {
                let scale = 10f64.powi(decimals);
                json!((value * scale).round() / scale)
            }
        };

        json!({
            "patient_id": self.id,
            "patient_name": self.name,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "heart_rate": metric(heart_rate, 0),
            "bp_systolic": metric(bp_systolic, 0),
            "bp_diastolic": metric(bp_diastolic, 0),
            "spo2": metric(spo2, 0),
            "temperature": metric(temperature, 1),
            "status": self.status,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let num_patients: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(20);
    let rounds: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);
    let interval_ms: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(1000);
    let host = std::env::var("VITALWATCH_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("VITALWATCH_PORT").unwrap_or_else(|_| "8080".to_string());
    let base_url = format!("http://{}:{}", host, port);

    println!("VitalWatch Simulator");
    println!("====================");
    println!("Target:    {}", base_url);
    println!("Patients:  {}", num_patients);
    println!("Rounds:    {}", rounds);
    println!("Interval:  {} ms", interval_ms);
    println!();

    let client = Client::new();
    let mut rng = StdRng::from_entropy();
    let mut patients: Vec<Patient> = (0..num_patients)
        .map(|i| Patient::generate(i, &mut rng))
        .collect();

    let mut total_alerts = 0u64;
    let mut total_updates = 0u64;
    let mut latencies = Vec::with_capacity(rounds);

    for round in 0..rounds {
        let records: Vec<Value> = patients
            .iter_mut()
            .map(|p| json!({ "event_type": "INSERT", "reading": p.reading(&mut rng) }))
            .collect();

        let start = Instant::now();
        let response = client
            .post(format!("{}/events", base_url))
            .json(&json!({ "records": records }))
            .send()
            .await?;

        if !response.status().is_success() {
            eprintln!("Error: {}", response.text().await?);
            return Ok(());
        }
        let summary: Value = response.json().await?;
        let latency = start.elapsed();
        latencies.push(latency);

        let alerts = summary["alerts_sent"].as_u64().unwrap_or(0);
        let updates = summary["updates_sent"].as_u64().unwrap_or(0);
        total_alerts += alerts;
        total_updates += updates;

        println!(
            "Round {:>3}: {} readings, {} alerts sent, {} updates sent ({:?})",
            round + 1,
            num_patients,
            alerts,
            updates,
            latency
        );

        if round + 1 < rounds {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    }

    println!();
    println!("Totals: {} alerts sent, {} updates sent", total_alerts, total_updates);
    if !latencies.is_empty() {
        let sum: Duration = latencies.iter().sum();
        latencies.sort();
        println!(
            "Latency: avg={:?} p50={:?} max={:?}",
            sum / latencies.len() as u32,
            latencies[latencies.len() / 2],
            latencies[latencies.len() - 1]
        );
    }

    let stats: Value = client
        .get(format!("{}/stats", base_url))
        .send()
        .await?
        .json()
        .await?;
    println!("Server stats: {}", serde_json::to_string_pretty(&stats["pipeline"])?);

    Ok(())
}
