use java_string::JavaString;

/// A constant value of an annotation element.
///
/// Enum constants, nested annotations and arrays have their own methods on the
/// [`AnnotationVisitor`][crate::visitor::annotation::AnnotationVisitor].
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
	Byte(i8),
	Char(u16),
	Double(f64),
	Float(f32),
	Int(i32),
	Long(i64),
	Short(i16),
	Boolean(bool),
	String(JavaString),
	/// A class literal, given as a return descriptor, like `Ljava/lang/String;` or `V`.
	Class(JavaString),
}

impl ElementValue {
	pub(crate) fn tag(&self) -> u8 {
		match self {
			ElementValue::Byte(_) => b'B',
			ElementValue::Char(_) => b'C',
			ElementValue::Double(_) => b'D',
			ElementValue::Float(_) => b'F',
			ElementValue::Int(_) => b'I',
			ElementValue::Long(_) => b'J',
			ElementValue::Short(_) => b'S',
			ElementValue::Boolean(_) => b'Z',
			ElementValue::String(_) => b's',
			ElementValue::Class(_) => b'c',
		}
	}
}
