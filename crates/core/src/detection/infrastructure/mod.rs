pub mod cascade_face_locator;
