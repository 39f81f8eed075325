use waypane::{initialize, Window, WindowConfig};

fn main() {
    env_logger::init();

    let globals = initialize(None);
    let window = Window::open(
        globals.clone(),
        None,
        WindowConfig {
            title: Some("waypane".to_owned()),
            size: Some((640, 480)),
            ..Default::default()
        },
    );
    window.set_reshape_callback(|_, width, height| {
        log::info!("reshaped to {}x{}", width, height);
    });

    while !window.should_close() {
        globals.dispatch();
    }
    log::info!("closed after {} ms", globals.elapsed_time());
}
