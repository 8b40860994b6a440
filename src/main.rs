use clap::Parser;
use dialoguer::Select;
use std::sync::{Arc, Mutex};
use std::{thread, time::Duration};
use stepsyncrs::{
    cli::{validate_device, Args},
    config::EngineConfig,
    engine::Engine,
    midi::{bind_external_clock, list_input_ports, MidirOutput, SharedMidiOutput},
    ui::run_state_inspector,
};

fn main() {
    initialize_logging();
    let args = Args::parse();

    if args.device_list {
        list_available_devices();
        return;
    }

    let output = build_output(&args);
    let shared_output: SharedMidiOutput = Arc::new(Mutex::new(output));
    let engine = Arc::new(Engine::new(&EngineConfig::default(), shared_output));

    if let Err(e) = engine.set_bpm(args.bpm) {
        log::error!("{}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }

    // Bound to an external device the engine waits for its clock; otherwise
    // it free-runs immediately.
    let _clock_input = match &args.bind_to_device {
        Some(device_name) => Some(bind_clock_input(Arc::clone(&engine), device_name)),
        None => {
            engine.play();
            None
        }
    };

    let inspector_engine = Arc::clone(&engine);
    thread::spawn(move || run_state_inspector(inspector_engine));

    run_application_loop();
}

fn initialize_logging() {
    stepsyncrs::logging::init_logger().expect("Logger initialization failed");
    log::info!("Application starting");
}

fn list_available_devices() {
    println!("Available MIDI input ports:");
    for port in list_input_ports().unwrap_or_default() {
        println!("  - {}", port);
    }
    println!("Available MIDI output ports:");
    for port in MidirOutput::list_ports().unwrap_or_default() {
        println!("  - {}", port);
    }
}

fn build_output(args: &Args) -> MidirOutput {
    let mut output = MidirOutput::new();

    let ports = MidirOutput::list_ports().unwrap_or_default();
    if ports.is_empty() {
        log::warn!("No MIDI output ports available, running silent");
        println!("No MIDI output ports available, running silent");
        return output;
    }

    let selection = match &args.midi_output {
        Some(name) => Some(name.clone()),
        None if ports.len() == 1 => Some(ports[0].clone()),
        None => prompt_output_port(&ports),
    };

    if let Some(device_name) = selection {
        match output.connect_default(Some(&device_name)) {
            Ok(()) => {
                log::info!("Connected to MIDI output: {}", device_name);
                println!("Connected to MIDI output: {}", device_name);
            }
            Err(e) => {
                let error_msg = format!("Error connecting to MIDI output: {}", e);
                log::error!("{}", error_msg);
                eprintln!("{}", error_msg);
                std::process::exit(1);
            }
        }
    }

    output
}

fn prompt_output_port(ports: &[String]) -> Option<String> {
    let selection = Select::new()
        .with_prompt("Select MIDI output port")
        .items(ports)
        .default(0)
        .interact();

    match selection {
        Ok(index) => Some(ports[index].clone()),
        Err(_) => None,
    }
}

fn bind_clock_input(
    engine: Arc<Engine>,
    device_name: &str,
) -> stepsyncrs::midi::ExternalClockInput {
    let inputs = list_input_ports().unwrap_or_default();
    if let Err(error_msg) = validate_device(device_name, &inputs) {
        log::error!("{}", error_msg);
        eprintln!("{}", error_msg);
        std::process::exit(1);
    }

    match bind_external_clock(engine, device_name) {
        Ok(connection) => {
            log::info!("Following external clock from: {}", device_name);
            println!("Following external clock from: {}", device_name);
            connection
        }
        Err(e) => {
            let error_msg = format!("Error binding external clock: {}", e);
            log::error!("{}", error_msg);
            eprintln!("{}", error_msg);
            std::process::exit(1);
        }
    }
}

fn run_application_loop() {
    log::info!("Application running. Press Ctrl+C to exit...");
    println!("\nPress Ctrl+C to exit...");
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
