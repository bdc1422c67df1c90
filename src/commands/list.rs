//! List serial ports

use serialport::SerialPortType;

/// List the serial ports a target could be attached to
pub fn list_ports() -> Result<(), Box<dyn std::error::Error>> {
    let ports = serialport::available_ports()?;

    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    println!("Serial ports:");
    println!();
    println!("  {:<24} {:<10} Description", "Port", "VID:PID");
    println!("  {:-<24} {:-<10} {:-<30}", "", "", "");

    for port in ports {
        let (ids, description) = match &port.port_type {
            SerialPortType::UsbPort(usb) => (
                format!("{:04X}:{:04X}", usb.vid, usb.pid),
                usb.product.clone().unwrap_or_else(|| "USB serial".into()),
            ),
            SerialPortType::PciPort => ("-".into(), "PCI".into()),
            SerialPortType::BluetoothPort => ("-".into(), "Bluetooth".into()),
            SerialPortType::Unknown => ("-".into(), String::new()),
        };
        println!("  {:<24} {:<10} {}", port.port_name, ids, description);
    }

    println!();
    println!("Use with: flashdock flash -p dev=<port>");

    Ok(())
}
