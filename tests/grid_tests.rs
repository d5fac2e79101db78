// Grid calculation over a spread of valid configurations

mod common;

use spot_grid_bot::{calculate_grid, GridConfig};

fn configs() -> Vec<(GridConfig, f64)> {
    let mut out = Vec::new();
    for (levels, spacing, balance, price) in [
        (1, 0.1, 100.0, 50.0),
        (2, 0.5, 900.0, 1_000_000.0),
        (5, 0.3, 10_000.0, 2_345_678.9),
        (20, 2.5, 1_000_000.0, 0.35),
        (49, 2.0, 12_345.0, 87_000.0),
    ] {
        let config = GridConfig {
            grid_levels: levels,
            grid_spacing: spacing,
            trade_balance: balance,
            ..common::create_test_grid_config()
        };
        assert!(config.validate().is_ok());
        out.push((config, price));
    }
    out
}

#[test]
fn test_grid_shape_for_valid_configs() {
    for (config, price) in configs() {
        let grid = calculate_grid(config.grid_levels, config.grid_spacing, config.trade_balance, price);

        assert_eq!(grid.len(), config.grid_levels);
        assert_eq!(grid.first().unwrap().level, 1);
        assert_eq!(grid.last().unwrap().level, config.grid_levels);

        for level in &grid {
            assert!(level.price_buy > 0.0);
            assert!(level.price_buy < price && price < level.price_sell);
        }

        for pair in grid.windows(2) {
            let gap_0 = pair[0].price_sell - pair[0].price_buy;
            let gap_1 = pair[1].price_sell - pair[1].price_buy;
            assert!(gap_1 > gap_0);
        }
    }
}

#[test]
fn test_grid_deploys_half_the_balance_per_side() {
    for (config, price) in configs() {
        let grid = calculate_grid(config.grid_levels, config.grid_spacing, config.trade_balance, price);

        let buys: f64 = grid.iter().map(|l| l.amount_buy).sum();
        let sells: f64 = grid.iter().map(|l| l.amount_sell * l.price_sell).sum();
        let half = config.trade_balance / 2.0;

        assert!((buys - half).abs() < 1e-6 * half);
        assert!((sells - half).abs() < 1e-6 * half);
    }
}
