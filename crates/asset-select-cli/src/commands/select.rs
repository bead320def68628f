use clap::Args;
use serde_json::Value;

use asset_select_core::market_data::{compute_return_statistics, PriceProvider};
use asset_select_core::program::build_portfolio_program;
use asset_select_core::selection::{self, SelectionRequest};

use crate::input;
use crate::input::prices::CsvPriceProvider;

#[derive(Args)]
pub struct SelectArgs {
    /// Selection request JSON (read from stdin when omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// CSV of closing prices: `date,SYM1,SYM2,...`
    #[arg(long)]
    pub prices: String,
}

#[derive(Args)]
pub struct ProgramArgs {
    /// Selection request JSON (read from stdin when omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// CSV of closing prices: `date,SYM1,SYM2,...`
    #[arg(long)]
    pub prices: String,
}

fn read_request(path: Option<&str>) -> Result<SelectionRequest, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        input::file::read_json(path)
    } else if let Some(request) = input::stdin::read_stdin()? {
        Ok(request)
    } else {
        Err("--input <request.json> or stdin required for asset selection".into())
    }
}

pub fn run_select(args: SelectArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request = read_request(args.input.as_deref())?;
    let provider = CsvPriceProvider::new(&args.prices);
    let result = selection::select_assets(&request, &provider)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_program(args: ProgramArgs) -> Result<String, Box<dyn std::error::Error>> {
    let request = read_request(args.input.as_deref())?;
    let provider = CsvPriceProvider::new(&args.prices);
    let prices = provider.fetch_closes(&request.universe, request.lookback_days)?;
    let stats = compute_return_statistics(&prices, &request.universe)?;
    let program =
        build_portfolio_program(&request.universe, &stats, request.risk_weight, request.budget)?;
    Ok(program.to_lp_string())
}
