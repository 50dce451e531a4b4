// Convert, embed and inspect int8 models, and replay board predictions on the desktop
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use int8_parity::byte_array::CArrayOptions;
use int8_parity::conversion::{ConversionPipeline, ExternalConverter};
use int8_parity::predict::dequantize_reading;
use int8_parity::sweep::{max_error, quantization_error_sweep, SweepPoint};
use int8_parity::{Interpreter, ModelArtifact, ParityConfig, PhysicalSample, Predictor, QuantParams, RoundingMode};
use log::info;
use plotters::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, allow_hyphen_values = true)]
    input_min: Option<f32>,

    #[arg(long, global = true, allow_hyphen_values = true)]
    input_max: Option<f32>,

    /// half_to_even or half_away_from_zero
    #[arg(long, global = true)]
    rounding: Option<RoundingMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print input/output descriptors and the operations a model uses
    Inspect {
        #[arg(short, long)]
        model: PathBuf,
        /// Read the model from C source `0xNN` literals
        #[arg(long)]
        embedded: bool,
    },
    /// Run one sample through a model and print every intermediate value
    Predict {
        #[arg(short, long)]
        model: PathBuf,
        #[arg(long)]
        embedded: bool,
        /// JSON array of physical values; defaults to the reference window
        #[arg(short, long)]
        sample: Option<PathBuf>,
    },
    /// Map a raw quantized output to physical units
    Dequantize {
        #[arg(long, allow_hyphen_values = true)]
        value: i32,
        #[arg(long)]
        scale: f32,
        #[arg(long, allow_hyphen_values = true)]
        zero_point: i32,
        /// Treat the value as uint8 instead of int8
        #[arg(long)]
        unsigned: bool,
    },
    /// Quantize a floating-point model with an external converter
    Convert {
        #[arg(short, long)]
        source: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
        /// Converter program, called as `<program> [args..] <source> <dataset.json> <output>`
        #[arg(long)]
        converter: PathBuf,
        #[arg(long = "converter-arg", allow_hyphen_values = true)]
        converter_args: Vec<String>,
        /// Also write the artifact as a C array
        #[arg(long)]
        embed: Option<PathBuf>,
        #[arg(long, default_value = "model_data")]
        array_name: String,
    },
    /// Write an artifact as a C array
    Embed {
        #[arg(short, long)]
        artifact: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long, default_value = "model_data")]
        array_name: String,
        /// Header to #include at the top
        #[arg(long)]
        header: Option<String>,
    },
    /// Plot input quantization error across the configured range
    Sweep {
        #[arg(short, long)]
        model: PathBuf,
        #[arg(long)]
        embedded: bool,
        #[arg(short, long, default_value = "quantization-error.png")]
        out: PathBuf,
        #[arg(long, default_value_t = 301)]
        steps: usize,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Inspect { model, embedded } => {
            let artifact = load_artifact(&model, embedded)?;
            println!("bytes: {}", artifact.len());
            println!("Model operations:");
            for op in artifact.operator_kinds()? {
                println!("  - {op}");
            }
            let interpreter = Interpreter::load(&artifact)?;
            for desc in interpreter.inputs() {
                println!("IN:  {desc}");
            }
            for desc in interpreter.outputs() {
                println!("OUT: {desc}");
            }
        }
        Command::Predict {
            model,
            embedded,
            sample,
        } => {
            let artifact = load_artifact(&model, embedded)?;
            let mut predictor = Predictor::new(Interpreter::load(&artifact)?, &config)?;
            let sample = match sample {
                Some(path) => PhysicalSample::from_json_file(&path, config.sample_len)
                    .with_context(|| format!("reading sample {}", path.display()))?,
                None => predictor.sample(PhysicalSample::reference().values().to_vec())?,
            };
            let prediction = predictor.predict(&sample)?;
            println!("{prediction}");
        }
        Command::Dequantize {
            value,
            scale,
            zero_point,
            unsigned,
        } => {
            let params = QuantParams::new(scale, zero_point)?;
            let scaler = config.scaler()?;
            let physical = if unsigned {
                let q = u8::try_from(value).with_context(|| format!("{value} is not a uint8"))?;
                dequantize_reading(q, params, &scaler)
            } else {
                let q = i8::try_from(value).with_context(|| format!("{value} is not an int8"))?;
                dequantize_reading(q, params, &scaler)
            };
            println!("{physical:.6}");
            println!("{physical:.2}");
        }
        Command::Convert {
            source,
            out,
            converter,
            converter_args,
            embed,
            array_name,
        } => {
            let embed = embed
                .map(|path| -> Result<_> {
                    let options = CArrayOptions {
                        name: array_name,
                        header: None,
                    };
                    options.validate()?;
                    Ok((path, options))
                })
                .transpose()?;
            let scratch = out.with_extension("convert");
            let converter = ExternalConverter::new(converter, &scratch).with_args(converter_args);
            let pipeline = ConversionPipeline::new(converter, config)?;
            let report = pipeline.run(&source, &out)?;
            let _ = fs::remove_dir(&scratch);

            println!("Model size: {:.2} KB", report.size_kib());
            println!("Model operations (register these in the board's op resolver):");
            for op in &report.operators {
                println!("  - {op}");
            }
            if let Some((path, options)) = embed {
                write_c_array(&report.artifact, &path, &options)?;
            }
        }
        Command::Embed {
            artifact,
            out,
            array_name,
            header,
        } => {
            let artifact = ModelArtifact::from_file(&artifact)?;
            let options = CArrayOptions {
                name: array_name,
                header,
            };
            write_c_array(&artifact, &out, &options)?;
        }
        Command::Sweep {
            model,
            embedded,
            out,
            steps,
        } => {
            let interpreter = Interpreter::load(&load_artifact(&model, embedded)?)?;
            let input = interpreter.input(0)?;
            let points = quantization_error_sweep(input, &config.scaler()?, config.rounding, steps)?;
            println!("max error: {:.6}", max_error(&points));
            plot_sweep(&points, &out)?;
            info!("wrote {}", out.display());
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ParityConfig> {
    let mut config = match &cli.config {
        Some(path) => ParityConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => ParityConfig::default(),
    };
    if let Some(min) = cli.input_min {
        config.input_min = min;
    }
    if let Some(max) = cli.input_max {
        config.input_max = max;
    }
    if let Some(rounding) = cli.rounding {
        config.rounding = rounding;
    }
    config.validate()?;
    Ok(config)
}

fn load_artifact(path: &Path, embedded: bool) -> Result<ModelArtifact> {
    let looks_embedded = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("c" | "cc" | "cpp" | "h")
    );
    let artifact = if embedded || looks_embedded {
        ModelArtifact::from_embedded_file(path)
    } else {
        ModelArtifact::from_file(path)
    };
    artifact.with_context(|| format!("loading model {}", path.display()))
}

fn write_c_array(artifact: &ModelArtifact, path: &Path, options: &CArrayOptions) -> Result<()> {
    let text = artifact.to_c_array(options)?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    println!("Converted to C array in {}", path.display());
    Ok(())
}

fn plot_sweep(points: &[SweepPoint], out: &Path) -> Result<()> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        bail!("nothing to plot");
    };
    let (x_min, x_max) = (first.physical, last.physical);
    let y_max = (max_error(points) * 1.1).max(f32::EPSILON); // Add 10% padding

    let root = BitMapBackend::new(out, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Input Quantization Error", ("sans-serif", 40).into_font())
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(75)
        .build_cartesian_2d(x_min..x_max, 0f32..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Physical Value")
        .y_desc("Absolute Round-Trip Error")
        .light_line_style(&WHITE.mix(0.8))
        .draw()?;

    chart
        .draw_series(LineSeries::new(points.iter().map(|p| (p.physical, p.error)), &RED))?
        .label("Error")
        .legend(|(x, y)| PathElement::new(vec![(x - 5, y), (x + 5, y)], &RED));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
