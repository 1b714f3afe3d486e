use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;
use rusqlite::{Connection, params};

/// Deterministic gaussian noise from a splitmix64 stream.
struct Noise(u64);

impl Noise {
    fn uniform(&mut self) -> f64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        ((z ^ (z >> 31)) >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller, one sample per call.
    fn gauss(&mut self, std_dev: f64) -> f64 {
        let u1 = self.uniform().max(1e-15);
        let u2 = self.uniform();
        std_dev * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

/// Linear trend plus noise, one value per year.
fn trend(rng: &mut Noise, years: &[i64], base: f64, slope: f64, noise: f64) -> Vec<f64> {
    (0..years.len())
        .map(|i| base + slope * i as f64 + rng.gauss(noise))
        .collect()
}

fn create_series(conn: &Connection, table: &str, column: &str, years: &[i64], values: &[f64]) -> Result<()> {
    conn.execute(&format!("CREATE TABLE {table} (year INTEGER, {column} REAL)"), [])
        .with_context(|| format!("creating {table}"))?;
    let mut stmt = conn.prepare(&format!("INSERT INTO {table} (year, {column}) VALUES (?1, ?2)"))?;
    for (year, value) in years.iter().zip(values) {
        stmt.execute(params![year, value])?;
    }
    Ok(())
}

const RULES: &str = "\
gdp:
  value_columns: [gdp]
population:
  value_columns: [population]
legacy_prices:
  monotonic_index: false
";

fn main() -> Result<()> {
    env_logger::init();

    let output_path = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "sample_store.db".into()));
    if output_path.exists() {
        std::fs::remove_file(&output_path)
            .with_context(|| format!("removing old {}", output_path.display()))?;
    }
    let conn = Connection::open(&output_path).context("creating sample store")?;
    let mut rng = Noise(42);

    let years: Vec<i64> = (1990..2024).collect();

    // Clean series with an overridden column name.
    let gdp = trend(&mut rng, &years, 100.0, 2.5, 0.4);
    create_series(&conn, "gdp", "gdp", &years, &gdp)?;

    // Default rule, one structural break → outlier warning.
    let mut co2 = trend(&mut rng, &years, 50.0, 0.5, 0.1);
    for v in co2.iter_mut().skip(25) {
        *v += 40.0;
    }
    create_series(&conn, "co2", "value", &years, &co2)?;

    // Missing years → gap warning.
    let gappy: Vec<i64> = years.iter().copied().filter(|y| !(2005..2008).contains(y)).collect();
    let population = trend(&mut rng, &gappy, 10.0, 0.1, 0.0);
    create_series(&conn, "population", "population", &gappy, &population)?;

    // Duplicated year → ERROR.
    let mut dup_years = years.clone();
    dup_years[10] = dup_years[9];
    let prices = trend(&mut rng, &dup_years, 3.0, 0.02, 0.01);
    create_series(&conn, "legacy_prices", "value", &dup_years, &prices)?;

    // Text in the value column → ERROR.
    conn.execute_batch(
        "CREATE TABLE survey (year INTEGER, value TEXT);
         INSERT INTO survey VALUES (2020, '1.5'), (2021, 'n/a'), (2022, NULL);",
    )?;

    let rules_path = output_path.with_extension("rules.yaml");
    std::fs::write(&rules_path, RULES).context("writing sample rules")?;

    info!("sample store ready");
    println!(
        "Wrote 5 tables to {} and rule overrides to {}",
        output_path.display(),
        rules_path.display()
    );
    Ok(())
}
