// tests/test_image.rs — Integration tests for Image<T>, ColorImage and
// grayscale conversion, through the public API only.

use prepro_bench::convert::{f32_raw_to_u8, to_grayscale};
use prepro_bench::image::{ColorImage, Frame, Image};

// ===== Image<T> =====

#[test]
fn image_from_vec_layout() {
    // 3×2 image, row-major:
    //  [10, 20, 30]
    //  [40, 50, 60]
    let img = Image::from_vec(3, 2, vec![10u8, 20, 30, 40, 50, 60]);
    assert_eq!(img.get(0, 0), 10);
    assert_eq!(img.get(2, 0), 30);
    assert_eq!(img.get(0, 1), 40);
    assert_eq!(img.get(2, 1), 60);
}

#[test]
fn image_stride_does_not_affect_pixel_access() {
    let mut img: Image<u8> = Image::new_with_stride(5, 3, 8);
    img.set(4, 2, 77);
    assert_eq!(img.get(4, 2), 77);
    assert_eq!(img.row(2).len(), 5);
    assert_eq!(img.to_packed_vec().len(), 15);
}

#[test]
fn clone_is_independent() {
    let mut a: Image<u8> = Image::new(4, 4);
    let b = a.clone();
    a.set(1, 1, 9);
    assert_eq!(b.get(1, 1), 0);
}

// ===== ColorImage =====

#[test]
fn color_image_pixel_access() {
    let mut img = ColorImage::filled_rgb(3, 2, [1, 2, 3]);
    img.set_pixel(2, 1, &[7, 8, 9]);
    assert_eq!(img.channels(), 3);
    assert_eq!(img.pixel(0, 0), &[1, 2, 3]);
    assert_eq!(img.pixel(2, 1), &[7, 8, 9]);
}

#[test]
#[should_panic(expected = "channels must be 1 or 3")]
fn color_image_rejects_two_channels() {
    ColorImage::from_vec(1, 1, 2, vec![0, 0]);
}

#[test]
fn frame_keeps_identifier() {
    let f = Frame::new("img_0001.jpg", ColorImage::filled_rgb(2, 2, [0, 0, 0]));
    assert_eq!(f.id, "img_0001.jpg");
}

// ===== Grayscale =====

#[test]
fn grayscale_primaries_follow_bt601() {
    let img = ColorImage::from_vec(3, 1, 3, vec![
        255, 0, 0,
        0, 255, 0,
        0, 0, 255,
    ]);
    let g = to_grayscale(&img);
    // 0.299·255 = 76.2, 0.587·255 = 149.7, 0.114·255 = 29.1
    assert_eq!(g.row(0), &[76, 150, 29]);
}

#[test]
fn grayscale_white_stays_white() {
    let g = to_grayscale(&ColorImage::filled_rgb(4, 4, [255, 255, 255]));
    assert!(g.pixels().all(|(_, _, v)| v == 255));
}

#[test]
fn grayscale_of_single_channel_is_a_copy() {
    let plane = Image::from_vec(2, 2, vec![3u8, 80, 160, 255]);
    let g = to_grayscale(&ColorImage::from_gray(&plane));
    assert_eq!(g.to_packed_vec(), plane.to_packed_vec());
}

#[test]
fn raw_conversion_preserves_values() {
    let src = Image::from_vec(4, 1, vec![0.0f32, 1.0, 128.0, 255.0]);
    assert_eq!(f32_raw_to_u8(&src).to_packed_vec(), vec![0u8, 1, 128, 255]);
}
