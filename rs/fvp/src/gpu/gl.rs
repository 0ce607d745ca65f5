//! OpenGL render targets, shared as a texture name or an EGL image.

use std::{ffi::c_void, fmt, ptr};

use gl::types::{GLenum, GLint, GLsizei, GLuint};

use super::{ExternalHandle, Gpu};
use crate::{Error, RenderApi, Result};

const EGL_DRAW: i32 = 0x3059;
const EGL_READ: i32 = 0x305a;
const EGL_NONE: i32 = 0x3038;
const EGL_TRUE: i32 = 1;
const EGL_GL_TEXTURE_2D_KHR: u32 = 0x30b1;
const EGL_IMAGE_PRESERVED_KHR: i32 = 0x30d2;

type EglGetCurrentContext = unsafe extern "system" fn() -> *mut c_void;
type EglGetCurrentDisplay = unsafe extern "system" fn() -> *mut c_void;
type EglGetCurrentSurface = unsafe extern "system" fn(readdraw: i32) -> *mut c_void;
type EglMakeCurrent =
	unsafe extern "system" fn(dpy: *mut c_void, draw: *mut c_void, read: *mut c_void, ctx: *mut c_void) -> u32;
type EglCreateImageKhr = unsafe extern "system" fn(
	dpy: *mut c_void,
	ctx: *mut c_void,
	target: u32,
	buffer: *mut c_void,
	attrib_list: *const i32,
) -> *mut c_void;
type EglDestroyImageKhr = unsafe extern "system" fn(dpy: *mut c_void, image: *mut c_void) -> u32;

/// The EGL entry points we need, resolved through the embedder's loader.
#[derive(Clone, Copy)]
struct Egl {
	get_current_context: EglGetCurrentContext,
	get_current_display: EglGetCurrentDisplay,
	get_current_surface: EglGetCurrentSurface,
	make_current: EglMakeCurrent,
	create_image: Option<EglCreateImageKhr>,
	destroy_image: Option<EglDestroyImageKhr>,
}

impl Egl {
	fn load(get_proc_address: &mut dyn FnMut(&str) -> *const c_void) -> Option<Self> {
		let mut load = |name: &str| {
			let ptr = get_proc_address(name);
			(!ptr.is_null()).then_some(ptr)
		};

		// SAFETY: the loader returns the address of the named EGL function, whose signature matches.
		unsafe {
			Some(Self {
				get_current_context: std::mem::transmute::<*const c_void, EglGetCurrentContext>(load(
					"eglGetCurrentContext",
				)?),
				get_current_display: std::mem::transmute::<*const c_void, EglGetCurrentDisplay>(load(
					"eglGetCurrentDisplay",
				)?),
				get_current_surface: std::mem::transmute::<*const c_void, EglGetCurrentSurface>(load(
					"eglGetCurrentSurface",
				)?),
				make_current: std::mem::transmute::<*const c_void, EglMakeCurrent>(load("eglMakeCurrent")?),
				create_image: load("eglCreateImageKHR")
					.map(|ptr| std::mem::transmute::<*const c_void, EglCreateImageKhr>(ptr)),
				destroy_image: load("eglDestroyImageKHR")
					.map(|ptr| std::mem::transmute::<*const c_void, EglDestroyImageKhr>(ptr)),
			})
		}
	}
}

/// How the texture is handed to the compositor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShareMode {
	/// The compositor's context shares objects with ours, so the texture name is enough.
	#[default]
	Texture,
	/// Wrap the texture in an `EGLImageKHR`.
	EglImage,
}

/// An EGL context with the surfaces it was current with.
#[derive(Clone, Copy)]
pub struct GlContext {
	display: usize,
	draw: usize,
	read: usize,
	context: usize,
}

impl GlContext {
	pub const NONE: Self = Self {
		display: 0,
		draw: 0,
		read: 0,
		context: 0,
	};

	pub fn is_none(&self) -> bool {
		self.context == 0
	}
}

// Surfaces may change between frames, the context identity doesn't.
impl PartialEq for GlContext {
	fn eq(&self, other: &Self) -> bool {
		self.display == other.display && self.context == other.context
	}
}

impl fmt::Debug for GlContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "GlContext({:#x}@{:#x})", self.context, self.display)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlTarget {
	pub fbo: GLuint,
	pub texture: GLuint,
}

/// Render targets in the compositor's GL context.
pub struct Gl {
	egl: Option<Egl>,
	mode: ShareMode,
}

impl Gl {
	/// Resolve GL and EGL through the embedder's loader, usually `eglGetProcAddress`.
	///
	/// EGL is optional in [ShareMode::Texture]; without it the context can't be switched, so
	/// [Gpu::make_current] fails and releases wait for the rendering thread to drain them.
	pub fn load<F>(mut get_proc_address: F, mode: ShareMode) -> Result<Self>
	where
		F: FnMut(&str) -> *const c_void,
	{
		gl::load_with(&mut get_proc_address);

		if !gl::GenFramebuffers::is_loaded() {
			tracing::error!("failed to load GL framebuffer functions");
			return Err(Error::Context);
		}

		let egl = Egl::load(&mut get_proc_address);
		match (&egl, mode) {
			(None, ShareMode::EglImage) => {
				tracing::error!("EGL is required to share EGL images");
				return Err(Error::Context);
			}
			(Some(egl), ShareMode::EglImage) if egl.create_image.is_none() || egl.destroy_image.is_none() => {
				tracing::error!("EGL_KHR_image_base is not available");
				return Err(Error::Image);
			}
			(None, _) => tracing::warn!("EGL not available, gpu objects can only be released while rendering"),
			_ => {}
		}

		Ok(Self { egl, mode })
	}

	pub fn mode(&self) -> ShareMode {
		self.mode
	}

	/// The context current on this thread, to pass to a populate call.
	pub fn current(&self) -> Option<GlContext> {
		let egl = self.egl.as_ref()?;

		// SAFETY: plain queries of thread state.
		let context = unsafe {
			GlContext {
				display: (egl.get_current_display)() as usize,
				draw: (egl.get_current_surface)(EGL_DRAW) as usize,
				read: (egl.get_current_surface)(EGL_READ) as usize,
				context: (egl.get_current_context)() as usize,
			}
		};

		(!context.is_none()).then_some(context)
	}
}

impl Gpu for Gl {
	type Context = GlContext;
	type Target = GlTarget;

	fn flip_y(&self) -> bool {
		true
	}

	fn create_target(&self, _context: &GlContext, width: u32, height: u32) -> Result<GlTarget> {
		let width = GLsizei::try_from(width).map_err(|_| Error::InvalidArgument("width"))?;
		let height = GLsizei::try_from(height).map_err(|_| Error::InvalidArgument("height"))?;

		// SAFETY: the context is current, as required by the trait.
		unsafe {
			let mut prev_fbo: GLint = 0;
			let mut prev_texture: GLint = 0;
			gl::GetIntegerv(gl::FRAMEBUFFER_BINDING, &mut prev_fbo);
			gl::GetIntegerv(gl::TEXTURE_BINDING_2D, &mut prev_texture);

			let mut fbo: GLuint = 0;
			let mut texture: GLuint = 0;
			gl::GenFramebuffers(1, &mut fbo);
			gl::GenTextures(1, &mut texture);

			gl::BindTexture(gl::TEXTURE_2D, texture);
			gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as GLint);
			gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as GLint);
			gl::TexImage2D(
				gl::TEXTURE_2D,
				0,
				gl::RGBA8 as GLint,
				width,
				height,
				0,
				gl::RGBA,
				gl::UNSIGNED_BYTE,
				ptr::null(),
			);

			gl::BindFramebuffer(gl::FRAMEBUFFER, fbo);
			gl::FramebufferTexture2D(gl::FRAMEBUFFER, gl::COLOR_ATTACHMENT0, gl::TEXTURE_2D, texture, 0);
			let status: GLenum = gl::CheckFramebufferStatus(gl::FRAMEBUFFER);

			gl::BindTexture(gl::TEXTURE_2D, prev_texture as GLuint);
			gl::BindFramebuffer(gl::FRAMEBUFFER, prev_fbo as GLuint);

			if status != gl::FRAMEBUFFER_COMPLETE {
				gl::DeleteFramebuffers(1, &fbo);
				gl::DeleteTextures(1, &texture);
				return Err(Error::Framebuffer(status));
			}

			Ok(GlTarget { fbo, texture })
		}
	}

	fn render_api(&self, target: &GlTarget) -> RenderApi {
		RenderApi::Gl { fbo: target.fbo }
	}

	fn share(&self, context: &GlContext, target: &GlTarget) -> Result<ExternalHandle> {
		if self.mode == ShareMode::Texture {
			return Ok(ExternalHandle::GlTexture {
				target: gl::TEXTURE_2D,
				name: target.texture,
			});
		}

		let create_image = self.egl.and_then(|egl| egl.create_image).ok_or(Error::Image)?;
		let attribs = [EGL_IMAGE_PRESERVED_KHR, EGL_TRUE, EGL_NONE];

		// SAFETY: the texture belongs to the given context, which is current.
		let image = unsafe {
			create_image(
				context.display as *mut c_void,
				context.context as *mut c_void,
				EGL_GL_TEXTURE_2D_KHR,
				target.texture as usize as *mut c_void,
				attribs.as_ptr(),
			)
		};

		if image.is_null() {
			return Err(Error::Image);
		}

		Ok(ExternalHandle::EglImage(image as usize))
	}

	fn release(&self, context: &GlContext, target: GlTarget, shared: Option<ExternalHandle>) {
		// SAFETY: the context is current and the objects were created in it.
		unsafe {
			if let (Some(ExternalHandle::EglImage(image)), Some(destroy)) =
				(shared, self.egl.and_then(|egl| egl.destroy_image))
			{
				destroy(context.display as *mut c_void, image as *mut c_void);
			}

			gl::DeleteTextures(1, &target.texture);
			gl::DeleteFramebuffers(1, &target.fbo);
		}
	}

	fn make_current(&self, context: &GlContext) -> Result<Option<GlContext>> {
		let Some(egl) = self.egl.as_ref() else {
			return Err(Error::Context);
		};
		let previous = self.current().unwrap_or(GlContext::NONE);

		if previous.context != context.context {
			// SAFETY: the context and surfaces were current on some thread before, and are still alive.
			let ok = unsafe {
				(egl.make_current)(
					context.display as *mut c_void,
					context.draw as *mut c_void,
					context.read as *mut c_void,
					context.context as *mut c_void,
				)
			};
			if ok == 0 {
				return Err(Error::Context);
			}
		}

		Ok(Some(previous))
	}

	fn restore(&self, previous: Option<GlContext>) {
		let (Some(egl), Some(previous)) = (self.egl.as_ref(), previous) else {
			return;
		};

		if self.current() == Some(previous) {
			return;
		}

		// Restoring "nothing current" still needs a display to unbind from.
		let display = match previous.is_none() {
			true => self.current().map(|current| current.display).unwrap_or(0),
			false => previous.display,
		};

		// SAFETY: restores the state observed in make_current.
		unsafe {
			(egl.make_current)(
				display as *mut c_void,
				previous.draw as *mut c_void,
				previous.read as *mut c_void,
				previous.context as *mut c_void,
			);
		}
	}
}
