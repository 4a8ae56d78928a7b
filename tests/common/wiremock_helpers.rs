use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Encode a solid square of `color` with a transparent one-pixel border as PNG
pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let mut img = RgbaImage::from_pixel(width, height, Rgba(color));
    for x in 0..width {
        img.put_pixel(x, 0, Rgba([0, 0, 0, 0]));
        img.put_pixel(x, height - 1, Rgba([0, 0, 0, 0]));
    }
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .expect("encode test PNG");
    out
}

/// Serve `png` at `route` for every request
pub async fn mount_png(server: &MockServer, route: &str, png: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png)
                .insert_header("content-type", "image/png"),
        )
        .mount(server)
        .await;
}

/// Serve `png` at `route`, expecting exactly `calls` requests
pub async fn mount_png_expecting(server: &MockServer, route: &str, png: Vec<u8>, calls: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png)
                .insert_header("content-type", "image/png"),
        )
        .expect(calls)
        .mount(server)
        .await;
}

/// Answer `route` with `status` and a short text body, expecting exactly `calls` requests
pub async fn mount_status(server: &MockServer, route: &str, status: u16, calls: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string("no logo here"))
        .expect(calls)
        .mount(server)
        .await;
}

/// Fail `route` with `status` for the first `failures` requests, then serve `png`.
///
/// wiremock matches mocks in registration order, so the limited failing mock
/// shadows the success mock until it is used up.
pub async fn mount_flaky_png(server: &MockServer, route: &str, status: u16, failures: u64, png: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .up_to_n_times(failures)
        .expect(failures)
        .mount(server)
        .await;

    mount_png_expecting(server, route, png, 1).await;
}

/// Serve `png` at `route` only after `delay`
pub async fn mount_slow_png(server: &MockServer, route: &str, png: Vec<u8>, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png)
                .insert_header("content-type", "image/png")
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Serve an HTML page with a 200 status at `route`
pub async fn mount_html(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>Parked domain</body></html>")
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}
