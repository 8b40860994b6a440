use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// List available MIDI ports
    #[arg(long)]
    pub device_list: bool,

    /// Follow the MIDI clock of a specific input device
    #[arg(long)]
    pub bind_to_device: Option<String>,

    /// Send to a specific MIDI output device
    #[arg(long)]
    pub midi_output: Option<String>,

    /// Initial tempo in beats per minute
    #[arg(long, default_value_t = 120.0)]
    pub bpm: f64,
}

pub fn validate_device(device_name: &str, devices: &[String]) -> Result<(), String> {
    if !devices.iter().any(|d| d.contains(device_name)) {
        let mut error_msg = format!(
            "Error: Device '{}' not found in available devices:\n",
            device_name
        );
        for device in devices {
            error_msg.push_str(&format!("  - {}\n", device));
        }
        return Err(error_msg);
    }
    Ok(())
}
