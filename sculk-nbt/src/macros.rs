///
/// Dispatches a generic operation over a payload ordinal. The body is instantiated once per
/// element type; the ordinal selects which instantiation runs. This is the single place the
/// ordinal-to-type mapping lives, shared by the reader, the writer, the list transfer and
/// [`crate::NbtPayload::default_for`].
macro_rules! with_element_type {
    ( $ordinal:expr, $ty:ident => $body:expr, $fallback:expr ) => {
        match $ordinal {
            0 => {
                type $ty = i8;
                $body
            }
            1 => {
                type $ty = i16;
                $body
            }
            2 => {
                type $ty = i32;
                $body
            }
            3 => {
                type $ty = i64;
                $body
            }
            4 => {
                type $ty = f32;
                $body
            }
            5 => {
                type $ty = f64;
                $body
            }
            6 => {
                type $ty = alloc::vec::Vec<i8>;
                $body
            }
            7 => {
                type $ty = alloc::string::String;
                $body
            }
            8 => {
                type $ty = $crate::NbtList;
                $body
            }
            9 => {
                type $ty = $crate::NbtCompound;
                $body
            }
            10 => {
                type $ty = alloc::vec::Vec<i32>;
                $body
            }
            11 => {
                type $ty = alloc::vec::Vec<i64>;
                $body
            }
            _ => $fallback,
        }
    };
}
