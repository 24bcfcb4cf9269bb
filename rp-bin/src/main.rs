mod cli;
mod dump;
mod loader;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use serde::Serialize;

use rp_global::GlobalPlacer;
use rp_tetris::TetrisLegalizer;
use rp_types::{Circuit, NoObserver, Phase, PlacementObserver};
use rp_well::GriddedRowLegalizer;

use cli::{Cli, ConfigFile};
use dump::MatlabDump;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // clap renders its own message; the exit code is ours
            let _ = e.print();
            return ExitCode::from(if e.use_stderr() { 1 } else { 0 });
        }
    };

    match drive(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn drive(cli: Cli) -> Result<bool> {
    let mut cfg = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read config file {}", path.display()))?;
            serde_json::from_str::<ConfigFile>(&text)
                .with_context(|| format!("malformed config file {}", path.display()))?
        }
        None => ConfigFile::default(),
    };
    cli.apply_overrides(&mut cfg);

    let well_paths: Vec<&std::path::Path> = cli
        .cell
        .iter()
        .chain(cli.mcell.iter())
        .map(|p| p.as_path())
        .collect();
    let mut ckt = loader::load_circuit(&cli.def, cli.lef.as_deref(), &well_paths)?;
    if let Some(grid) = &cli.grid {
        ckt.grid_value_x = grid[0];
        ckt.grid_value_y = grid[1];
    }
    info!(
        "loaded {} blocks, {} nets, {} types",
        ckt.blocks.len(),
        ckt.nets.len(),
        ckt.types.len()
    );

    let mut observer: Box<dyn PlacementObserver> = if cli.dump {
        Box::new(MatlabDump::new(&cli.output, &ckt))
    } else {
        Box::new(NoObserver)
    };

    if !cli.noglobal {
        let placer = GlobalPlacer::new(cfg.global.clone());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cli.nthreads.unwrap_or(1))
            .build()
            .context("cannot build the global-phase thread pool")?;
        pool.install(|| placer.place(&mut ckt))?;
        observer.on_phase_end(Phase::GlobalPlacement, &ckt);
    }

    let mut success = true;
    if !cli.nolegal {
        // the well flow runs when per-type well data is present
        let has_wells = ckt.types.iter().any(|t| t.well.is_some());
        if has_wells {
            let mut legalizer = GriddedRowLegalizer::new(cfg.well.clone());
            success = legalizer.legalize(&mut ckt)?;
            observer.on_phase_end(Phase::WellLegalization, &ckt);
        } else {
            let legalizer = TetrisLegalizer::new(cfg.tetris.clone());
            success = legalizer.legalize(&mut ckt)?;
            observer.on_phase_end(Phase::TetrisLegalization, &ckt);
        }
    }
    if cli.noioplace {
        info!("I/O-pin placement is left to the external flow");
    }

    write_placement(&ckt, &cli.output)?;
    if !success {
        warn!("placement finished with a failed phase; results are best-effort");
    }
    Ok(success)
}

#[derive(Serialize)]
struct PlacedBlock<'a> {
    name: &'a str,
    x: f64,
    y: f64,
    orient: rp_types::Orient,
    stretch: &'a [rp_types::I],
}

/// The placed design as JSON; DEF export belongs to the external flow.
fn write_placement(ckt: &Circuit, base: &str) -> Result<()> {
    let placed: Vec<PlacedBlock> = ckt
        .blocks
        .iter()
        .map(|b| PlacedBlock {
            name: &b.name,
            x: b.llx,
            y: b.lly,
            orient: b.orient,
            stretch: &b.stretch,
        })
        .collect();
    let path = format!("{base}_placement.json");
    let file = std::fs::File::create(&path)
        .with_context(|| format!("cannot create output file {path}"))?;
    serde_json::to_writer_pretty(file, &placed).context("cannot serialize placement")?;
    info!("placement written to {path}");
    Ok(())
}
