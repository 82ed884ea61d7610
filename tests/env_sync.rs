use algogem::{
    AppendOutcome, CandleWindow, EnvError, PriceProvider, PriceRecord, ProviderError, Symbol,
    TradingEnv,
};
use tempfile::tempdir;

const START_TS_MS: i64 = 1_704_067_200_000; // 2024-01-01T00:00:00Z
const DAY_MS: i64 = 86_400_000;

struct MockProvider {
    rows: Vec<PriceRecord>,
}

impl PriceProvider for MockProvider {
    fn fetch_history(
        &self,
        _symbol: Symbol,
        _window: CandleWindow,
    ) -> Result<Vec<PriceRecord>, ProviderError> {
        Ok(self.rows.clone())
    }
}

struct FailingProvider;

impl PriceProvider for FailingProvider {
    fn fetch_history(
        &self,
        _symbol: Symbol,
        _window: CandleWindow,
    ) -> Result<Vec<PriceRecord>, ProviderError> {
        Err(ProviderError("simulated outage".to_string()))
    }
}

fn daily_rows(count: usize) -> Vec<PriceRecord> {
    (0..count)
        .map(|idx| PriceRecord {
            ts_ms_utc: START_TS_MS + idx as i64 * DAY_MS,
            open: 99.0 + idx as f64,
            high: 101.0 + idx as f64,
            low: 98.0 + idx as f64,
            close: 100.0 + idx as f64,
            volume: 10.0,
        })
        .collect()
}

fn configured_env(temp: &tempfile::TempDir) -> TradingEnv {
    let mut env = TradingEnv::new(temp.path().join("prices.sqlite")).expect("env should open");
    env.set_symbol("BTC").unwrap();
    env.set_window("D").unwrap();
    env
}

#[test]
fn sync_requires_symbol_and_window() {
    let temp = tempdir().expect("temp dir should be created");
    let mut env = TradingEnv::new(temp.path().join("prices.sqlite")).expect("env should open");
    let provider = MockProvider { rows: daily_rows(2) };

    let err = env.update_historical(&provider).unwrap_err();
    assert!(matches!(err, EnvError::Unconfigured("symbol")));

    env.set_symbol("btc").unwrap();
    let err = env.update_historical(&provider).unwrap_err();
    assert!(matches!(err, EnvError::Unconfigured("window")));

    env.set_window("d").unwrap();
    env.update_historical(&provider).unwrap();
}

#[test]
fn configuration_setters_reject_invalid_values() {
    let temp = tempdir().expect("temp dir should be created");
    let mut env = TradingEnv::new(temp.path().join("prices.sqlite")).expect("env should open");

    assert!(matches!(
        env.set_symbol("DOGE").unwrap_err(),
        EnvError::Symbol(_)
    ));
    assert!(matches!(
        env.set_window("W").unwrap_err(),
        EnvError::InvalidWindow(_)
    ));
    assert_eq!(env.symbol(), None);
    assert_eq!(env.window(), None);
}

#[test]
fn overlapping_refetch_appends_only_new_rows() {
    let temp = tempdir().expect("temp dir should be created");
    let env = configured_env(&temp);

    let first = MockProvider { rows: daily_rows(5) };
    assert_eq!(
        env.update_historical(&first).unwrap(),
        AppendOutcome::Appended {
            rows: 5,
            skipped_existing: 0,
        }
    );

    // Same window again: everything is already covered.
    assert_eq!(
        env.update_historical(&first).unwrap(),
        AppendOutcome::NoNewRows
    );

    // Provider now sees two extra days; only those land.
    let extended = MockProvider { rows: daily_rows(7) };
    assert_eq!(
        env.update_historical(&extended).unwrap(),
        AppendOutcome::Appended {
            rows: 2,
            skipped_existing: 5,
        }
    );

    assert_eq!(env.store().read_all(Symbol::Btc).unwrap().len(), 7);
}

#[test]
fn provider_failures_propagate_as_typed_errors() {
    let temp = tempdir().expect("temp dir should be created");
    let env = configured_env(&temp);

    let err = env.update_historical(&FailingProvider).unwrap_err();
    assert!(matches!(err, EnvError::Provider(_)));
    assert_eq!(env.store().read_all(Symbol::Btc).unwrap(), Vec::new());
}

#[test]
fn load_stored_builds_a_dataset_from_history() {
    let temp = tempdir().expect("temp dir should be created");
    let env = configured_env(&temp);
    env.update_historical(&MockProvider { rows: daily_rows(5) })
        .unwrap();

    let dataset = env.load_stored(None).unwrap();
    assert_eq!(dataset.raw().len(), 5);
    assert_eq!(dataset.sample().rows.len(), 4);

    let subset = env
        .load_stored(Some((START_TS_MS + DAY_MS, START_TS_MS + 3 * DAY_MS)))
        .unwrap();
    assert_eq!(subset.raw().len(), 3);
    assert_eq!(subset.raw()[0].ts_ms_utc, START_TS_MS + DAY_MS);
}

#[test]
fn load_stored_on_empty_symbol_yields_empty_dataset() {
    let temp = tempdir().expect("temp dir should be created");
    let env = configured_env(&temp);

    let dataset = env.load_stored(None).unwrap();
    assert!(dataset.raw().is_empty());
    assert!(dataset.sample().rows.is_empty());
}
